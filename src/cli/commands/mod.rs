//! CLI command implementations.

mod ask;
mod init;
mod list;
mod serve;
mod status;
mod submit;

pub use ask::run_ask;
pub use init::run_init;
pub use list::run_list;
pub use serve::run_serve;
pub use status::run_status;
pub use submit::run_submit;

use crate::chunking::ChunkingPolicy;
use crate::config::Settings;
use crate::embedding::OpenAIEmbedder;
use crate::orchestrator::{Orchestrator, RetryPolicy};
use crate::retrieval::QueryEngine;
use crate::store::SessionStore;
use crate::transcription::WhisperTranscriber;
use std::sync::Arc;

/// Open the session store at the configured path.
fn open_store(settings: &Settings) -> anyhow::Result<Arc<SessionStore>> {
    let path = settings.sqlite_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Arc::new(SessionStore::open(&path)?))
}

/// Build the ingestion orchestrator from settings.
fn build_orchestrator(settings: &Settings, store: Arc<SessionStore>) -> Arc<Orchestrator> {
    let transcriber = Arc::new(WhisperTranscriber::with_config(
        &settings.transcription.model,
        settings.transcription.max_duration_seconds,
    ));
    let retry = RetryPolicy {
        max_attempts: settings.transcription.max_attempts.max(1),
    };
    let chunking = ChunkingPolicy::from_name(
        &settings.chunking.policy,
        settings.chunking.words_per_chunk,
    );
    Arc::new(Orchestrator::new(store, transcriber, retry, chunking))
}

/// Build the retrieval engine from settings.
fn build_query_engine(
    settings: &Settings,
    store: Arc<SessionStore>,
) -> anyhow::Result<Arc<QueryEngine>> {
    let dimensions = settings.embedding.dimensions as usize;
    let embedder = Arc::new(OpenAIEmbedder::with_config(
        &settings.embedding.model,
        dimensions,
    ));
    Ok(Arc::new(QueryEngine::new(
        store,
        embedder,
        dimensions,
        settings.retrieval.top_k,
        settings.retrieval.distance_threshold,
    )?))
}
