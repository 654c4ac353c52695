//! Question answering over a session's persisted chunks.
//!
//! Builds a per-query similarity index over a completed session's chunks,
//! searches it with the question embedding, and assembles the answer from the
//! matching chunks in narrative order.

use crate::embedding::Embedder;
use crate::error::{HarkError, Result};
use crate::index::FlatIndex;
use crate::store::{ProcessingStatus, SessionStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Safety ceiling on the number of chunks a single query will index.
/// Sessions above this are rejected before any embedding work occurs.
pub const MAX_INDEXED_CHUNKS: usize = 2000;

/// Fixed response when nothing relevant survives filtering.
pub const NO_RELEVANT_CONTENT: &str =
    "No relevant content was found in this session's transcript.";

/// One source descriptor backing an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    /// Narrative position of the chunk.
    pub chunk_index: i64,
    /// L2 distance between the question and the chunk.
    pub distance: f32,
    /// Start time of the chunk in seconds.
    pub start_time: f64,
    /// End time of the chunk in seconds.
    pub end_time: f64,
}

/// An assembled answer with its sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

impl QueryAnswer {
    fn no_relevant_content() -> Self {
        Self {
            answer: NO_RELEVANT_CONTENT.to_string(),
            sources: Vec::new(),
        }
    }
}

/// Retrieval engine: answers questions against one session's chunks.
pub struct QueryEngine {
    store: Arc<SessionStore>,
    embedder: Arc<dyn Embedder>,
    expected_dimensions: usize,
    top_k: usize,
    distance_threshold: f32,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("expected_dimensions", &self.expected_dimensions)
            .field("top_k", &self.top_k)
            .field("distance_threshold", &self.distance_threshold)
            .finish_non_exhaustive()
    }
}

impl QueryEngine {
    /// Create a query engine.
    ///
    /// `expected_dimensions` is the configured embedding width; an embedder
    /// reporting anything else is a configuration fault and is rejected here,
    /// before any query runs.
    pub fn new(
        store: Arc<SessionStore>,
        embedder: Arc<dyn Embedder>,
        expected_dimensions: usize,
        top_k: usize,
        distance_threshold: f32,
    ) -> Result<Self> {
        if embedder.dimensions() != expected_dimensions {
            return Err(HarkError::Config(format!(
                "Embedder dimension {} mismatches expected {}",
                embedder.dimensions(),
                expected_dimensions
            )));
        }

        Ok(Self {
            store,
            embedder,
            expected_dimensions,
            top_k,
            distance_threshold,
        })
    }

    /// Answer a question against a session's transcript chunks.
    ///
    /// Fails with `NotFound` for an unknown or not-yet-completed session,
    /// `DataIntegrity` when a COMPLETED session is missing its transcript or
    /// chunks, and `TranscriptTooLarge` above the index ceiling. An empty
    /// transcript is benign and yields the fixed no-content response.
    #[instrument(skip(self, question))]
    pub async fn answer(&self, session_id: i64, question: &str) -> Result<QueryAnswer> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| HarkError::NotFound("Session not found".to_string()))?;

        if session.processing_status != ProcessingStatus::Completed {
            return Err(HarkError::NotFound(format!(
                "Session {} is not ready for queries (status: {})",
                session_id, session.processing_status
            )));
        }

        let transcript = self.store.get_transcript(session_id)?.ok_or_else(|| {
            HarkError::DataIntegrity(format!(
                "Session {} is COMPLETED but has no transcript",
                session_id
            ))
        })?;

        if transcript.full_text.trim().is_empty() {
            debug!("Transcript for session {} is empty", session_id);
            return Ok(QueryAnswer::no_relevant_content());
        }

        let chunks = self.store.get_chunks(session_id)?;
        if chunks.is_empty() {
            return Err(HarkError::DataIntegrity(format!(
                "Session {} is COMPLETED but has no chunks",
                session_id
            )));
        }

        if chunks.len() > MAX_INDEXED_CHUNKS {
            return Err(HarkError::TranscriptTooLarge(format!(
                "Session {} has {} chunks, above the limit of {}",
                session_id,
                chunks.len(),
                MAX_INDEXED_CHUNKS
            )));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.chunk_text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        let index = FlatIndex::build(self.expected_dimensions, embeddings)?;

        let query_vector = self.embedder.embed(question).await?;
        let outcome = index.search(&query_vector, self.top_k, self.distance_threshold)?;

        info!(
            "Session {}: {} matches within threshold, top distance {}",
            session_id,
            outcome.matches.len(),
            outcome.top_distance
        );

        if outcome.matches.is_empty() {
            return Ok(QueryAnswer::no_relevant_content());
        }

        let matched: HashMap<usize, f32> = outcome
            .matches
            .iter()
            .map(|(dist, idx)| (*idx, *dist))
            .collect();

        // Assemble in narrative order, not distance rank, skipping chunks
        // whose exact text already appeared.
        let mut seen_texts: HashSet<&str> = HashSet::new();
        let mut included_texts: Vec<&str> = Vec::new();
        let mut sources = Vec::new();

        for (position, chunk) in chunks.iter().enumerate() {
            let Some(distance) = matched.get(&position) else {
                continue;
            };
            if !seen_texts.insert(chunk.chunk_text.as_str()) {
                continue;
            }
            included_texts.push(chunk.chunk_text.as_str());
            sources.push(SourceRef {
                chunk_index: chunk.chunk_index,
                distance: *distance,
                start_time: chunk.start_time,
                end_time: chunk.end_time,
            });
        }

        if included_texts.is_empty() {
            return Ok(QueryAnswer::no_relevant_content());
        }

        Ok(QueryAnswer {
            answer: included_texts.join("\n\n"),
            sources,
        })
    }
}
