//! Hark - Media Ingestion and Retrieval
//!
//! A local-first tool for ingesting audio/video sources into transcribed,
//! chunked sessions, and answering questions against them.
//!
//! # Overview
//!
//! Hark allows you to:
//! - Submit media sources for download, transcription, and chunking
//! - Track each session through its processing lifecycle
//! - Ask questions against a completed session with cited chunks
//! - Serve the same operations over an HTTP API
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management
//! - `audio` - Audio download
//! - `transcription` - Speech-to-text transcription
//! - `chunking` - Transcript chunking policies
//! - `embedding` - Embedding generation
//! - `index` - Flat vector index for per-query search
//! - `store` - SQLite session store
//! - `orchestrator` - Ingestion pipeline coordination
//! - `retrieval` - Question answering over chunks
//! - `server` - HTTP API
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hark::chunking::ChunkingPolicy;
//! use hark::orchestrator::{Orchestrator, RetryPolicy};
//! use hark::store::SessionStore;
//! use hark::transcription::WhisperTranscriber;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(SessionStore::open(std::path::Path::new("sessions.db"))?);
//!     let orchestrator = Orchestrator::new(
//!         store.clone(),
//!         Arc::new(WhisperTranscriber::new()),
//!         RetryPolicy::default(),
//!         ChunkingPolicy::SegmentAware,
//!     );
//!
//!     let session = store.create_session(1, "https://example.com/talk", 1)?;
//!     orchestrator.process_session(session.session_id).await;
//!
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod openai;
pub mod orchestrator;
pub mod retrieval;
pub mod server;
pub mod store;
pub mod transcription;

pub use error::{HarkError, Result};
