//! Submit command - create a session and run it to a terminal state.

use crate::cli::Output;
use crate::config::Settings;
use crate::store::ProcessingStatus;
use std::sync::Arc;
use std::time::Duration;

/// Submit a source URL and process it.
///
/// The pipeline runs inside this process, so the command always waits for a
/// terminal state; `--wait` additionally shows live progress.
pub async fn run_submit(
    url: &str,
    subject_id: i64,
    user_id: i64,
    wait: bool,
    settings: Settings,
) -> anyhow::Result<()> {
    if url::Url::parse(url).is_err() {
        anyhow::bail!("Invalid source URL: {}", url);
    }

    let store = super::open_store(&settings)?;
    let orchestrator = super::build_orchestrator(&settings, store.clone());

    let session = store.create_session(subject_id, url, user_id)?;
    let session_id = session.session_id;
    Output::success(&format!("Created session #{}", session_id));

    let worker = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator.process_session(session_id).await;
        })
    };

    if wait {
        let spinner = Output::spinner("Processing...");
        loop {
            tokio::time::sleep(Duration::from_millis(500)).await;
            let Some(session) = store.get_session(session_id)? else {
                break;
            };
            if session.processing_status.is_terminal() {
                break;
            }
            spinner.set_message(format!("Processing ({})...", session.processing_status));
        }
        spinner.finish_and_clear();
    }

    worker.await?;

    let session = store
        .get_session(session_id)?
        .ok_or_else(|| anyhow::anyhow!("Session #{} disappeared", session_id))?;

    match session.processing_status {
        ProcessingStatus::Completed => {
            Output::success(&format!(
                "Session #{} completed in {:.1}s",
                session_id,
                session.duration.unwrap_or(0.0)
            ));
        }
        ProcessingStatus::Failed => {
            Output::error(&format!(
                "Session #{} failed: {}",
                session_id,
                session.failure_reason.as_deref().unwrap_or("unknown")
            ));
        }
        other => {
            Output::warning(&format!("Session #{} ended in state {}", session_id, other));
        }
    }

    Ok(())
}
