//! Ask command - question answering against a completed session.

use crate::cli::Output;
use crate::config::Settings;
use console::style;

/// Answer a question from a session's chunks.
pub async fn run_ask(session_id: i64, question: &str, settings: Settings) -> anyhow::Result<()> {
    let store = super::open_store(&settings)?;
    let engine = super::build_query_engine(&settings, store)?;

    let spinner = Output::spinner("Searching...");
    let result = engine.answer(session_id, question).await;
    spinner.finish_and_clear();

    let answer = result?;

    Output::header("Answer");
    println!("{}", answer.answer);

    if !answer.sources.is_empty() {
        println!();
        println!("{}", style("Sources").bold());
        for source in &answer.sources {
            Output::source_line(
                source.chunk_index,
                source.start_time,
                source.end_time,
                source.distance,
            );
        }
    }

    Ok(())
}
