//! Status command - show a session's progress.

use crate::cli::Output;
use crate::config::Settings;

/// Show the status of one session.
pub async fn run_status(session_id: i64, settings: Settings) -> anyhow::Result<()> {
    let store = super::open_store(&settings)?;

    let session = store
        .get_session(session_id)?
        .ok_or_else(|| anyhow::anyhow!("Session not found: {}", session_id))?;

    Output::header(&format!("Session #{}", session.session_id));
    Output::kv("Source", &session.source_url);
    Output::kv("Status", &session.processing_status.to_string());
    Output::kv("Created", &session.created_at.to_rfc3339());
    if let Some(started) = session.started_at {
        Output::kv("Started", &started.to_rfc3339());
    }
    if let Some(completed) = session.completed_at {
        Output::kv("Completed", &completed.to_rfc3339());
    }
    if let Some(duration) = session.duration {
        Output::kv("Duration", &format!("{:.1}s", duration));
    }
    if let Some(reason) = &session.failure_reason {
        Output::kv("Failure", reason);
    }

    Ok(())
}
