//! Serve command - run the HTTP API.

use crate::cli::Output;
use crate::config::Settings;
use crate::server::{run_server, AppState};
use std::sync::Arc;

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    let store = super::open_store(&settings)?;
    let orchestrator = super::build_orchestrator(&settings, store.clone());
    let query_engine = super::build_query_engine(&settings, store.clone())?;

    let state = Arc::new(AppState {
        store,
        orchestrator,
        query_engine,
    });

    Output::header("Hark API Server");
    println!();
    Output::success(&format!("Listening on http://{}:{}", host, port));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Submit", "POST /sessions");
    Output::kv("List", "GET  /sessions");
    Output::kv("Status", "GET  /sessions/:id");
    Output::kv("Query", "POST /sessions/:id/query");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    run_server(host, port, state).await
}
