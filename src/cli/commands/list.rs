//! List command - show all sessions.

use crate::cli::Output;
use crate::config::Settings;

/// List all sessions, newest first.
pub async fn run_list(settings: Settings) -> anyhow::Result<()> {
    let store = super::open_store(&settings)?;
    let sessions = store.list_sessions()?;

    if sessions.is_empty() {
        Output::info("No sessions yet. Submit one with 'hark submit <url>'.");
        return Ok(());
    }

    Output::header(&format!("Sessions ({})", sessions.len()));
    for session in &sessions {
        Output::session_line(
            session.session_id,
            &session.processing_status.to_string(),
            &session.source_url,
            session.duration,
        );
    }

    Ok(())
}
