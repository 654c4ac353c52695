//! Configuration module for Hark.
//!
//! Handles loading and managing application settings.

mod settings;

pub use settings::{
    ChunkingSettings, EmbeddingSettings, GeneralSettings, RetrievalSettings, ServerSettings,
    Settings, StoreSettings, TranscriptionSettings,
};
