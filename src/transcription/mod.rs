//! Transcription provider contract and data model.
//!
//! The ingestion pipeline only depends on the [`Transcriber`] trait; the
//! production implementation talks to OpenAI Whisper, tests inject fakes.

mod whisper;

pub use whisper::{is_api_key_configured, WhisperTranscriber};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single time-aligned segment of a transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start time in seconds.
    pub start_seconds: f64,
    /// End time in seconds.
    pub end_seconds: f64,
    /// Transcribed text content.
    pub text: String,
}

impl TranscriptSegment {
    /// Create a new transcript segment.
    pub fn new(start_seconds: f64, end_seconds: f64, text: String) -> Self {
        Self {
            start_seconds,
            end_seconds,
            text,
        }
    }

    /// Duration of this segment in seconds.
    pub fn duration(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }
}

/// The output of a transcription call: full text, detected language, and
/// time-aligned segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    /// Full transcript text.
    pub full_text: String,
    /// Detected language tag (e.g., "english").
    pub language: String,
    /// Time-aligned segments. May be empty when the provider returns only
    /// plain text; chunking falls back accordingly.
    pub segments: Vec<TranscriptSegment>,
}

impl TranscriptionResult {
    /// Build a result from segments, deriving the full text by joining them.
    pub fn from_segments(language: String, segments: Vec<TranscriptSegment>) -> Self {
        let full_text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            full_text,
            language,
            segments,
        }
    }

    /// Total duration covered by the segments, in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.segments.last().map(|s| s.end_seconds).unwrap_or(0.0)
    }
}

/// Trait for transcription providers.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the media behind a source URL.
    async fn transcribe(&self, source_url: &str) -> Result<TranscriptionResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_segments() {
        let segments = vec![
            TranscriptSegment::new(0.0, 5.0, "Hello world".to_string()),
            TranscriptSegment::new(5.0, 10.0, "This is a test".to_string()),
        ];

        let result = TranscriptionResult::from_segments("english".to_string(), segments);

        assert_eq!(result.full_text, "Hello world This is a test");
        assert_eq!(result.duration_seconds(), 10.0);
    }

    #[test]
    fn test_empty_segments() {
        let result = TranscriptionResult::from_segments("english".to_string(), vec![]);
        assert!(result.full_text.is_empty());
        assert_eq!(result.duration_seconds(), 0.0);
    }
}
