//! OpenAI Whisper transcription implementation.

use super::{Transcriber, TranscriptSegment, TranscriptionResult};
use crate::audio::{download_audio, probe_duration};
use crate::error::{HarkError, Result};
use crate::openai::create_client;
use async_openai::types::{AudioResponseFormat, CreateTranscriptionRequestArgs};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Default ceiling on media duration (2 hours).
const DEFAULT_MAX_DURATION_SECONDS: u32 = 7200;

/// OpenAI Whisper-based transcriber.
///
/// Probes the media duration and rejects over-long sources, downloads the
/// audio behind the source URL with yt-dlp into a scratch directory, then
/// submits it to the Whisper API in verbose JSON mode to get time-aligned
/// segments alongside the full text.
pub struct WhisperTranscriber {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    max_duration_seconds: u32,
}

impl WhisperTranscriber {
    /// Create a new Whisper transcriber with the default model and limits.
    pub fn new() -> Self {
        Self::with_config("whisper-1", DEFAULT_MAX_DURATION_SECONDS)
    }

    /// Create a new Whisper transcriber with a custom model and duration
    /// ceiling.
    pub fn with_config(model: &str, max_duration_seconds: u32) -> Self {
        Self {
            client: create_client(),
            model: model.to_string(),
            max_duration_seconds,
        }
    }

    #[instrument(skip(self, audio_path))]
    async fn transcribe_file(&self, audio_path: &std::path::Path) -> Result<TranscriptionResult> {
        debug!("Transcribing audio file {:?}", audio_path);

        let file_bytes = tokio::fs::read(audio_path).await?;

        let request = CreateTranscriptionRequestArgs::default()
            .file(async_openai::types::AudioInput::from_vec_u8(
                audio_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("audio.mp3")
                    .to_string(),
                file_bytes,
            ))
            .model(&self.model)
            .response_format(AudioResponseFormat::VerboseJson)
            .build()
            .map_err(|e| HarkError::Transcription(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .audio()
            .transcribe_verbose_json(request)
            .await
            .map_err(|e| HarkError::OpenAI(format!("Whisper API error: {}", e)))?;

        let segments: Vec<TranscriptSegment> = response
            .segments
            .map(|segs| {
                segs.iter()
                    .map(|s| {
                        TranscriptSegment::new(
                            s.start as f64,
                            s.end as f64,
                            s.text.trim().to_string(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        debug!("Transcribed {} segments", segments.len());

        Ok(TranscriptionResult {
            full_text: response.text.trim().to_string(),
            language: response.language,
            segments,
        })
    }
}

impl Default for WhisperTranscriber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    #[instrument(skip(self), fields(source_url = %source_url))]
    async fn transcribe(&self, source_url: &str) -> Result<TranscriptionResult> {
        let duration = probe_duration(source_url).await?;
        ensure_within_limit(duration, self.max_duration_seconds)?;

        let temp_dir = tempfile::tempdir()?;
        let audio_path = download_audio(source_url, "audio", temp_dir.path()).await?;

        let result = self.transcribe_file(&audio_path).await;

        // tempdir removes the downloaded audio on drop
        drop(temp_dir);
        result
    }
}

/// Reject media longer than the configured ceiling before any download or
/// transcription work. An unknown duration is allowed through.
fn ensure_within_limit(duration: Option<f64>, max_seconds: u32) -> Result<()> {
    if let Some(d) = duration {
        if d > max_seconds as f64 {
            return Err(HarkError::InvalidInput(format!(
                "Media duration ({:.0} seconds) exceeds maximum ({} seconds)",
                d, max_seconds
            )));
        }
    }
    Ok(())
}

/// Check if the OpenAI API key is configured.
pub fn is_api_key_configured() -> bool {
    std::env::var("OPENAI_API_KEY").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_check() {
        let _ = is_api_key_configured();
    }

    #[test]
    fn test_duration_limit_enforced() {
        assert!(ensure_within_limit(Some(7201.0), 7200).is_err());
        assert!(ensure_within_limit(Some(7200.0), 7200).is_ok());
        assert!(ensure_within_limit(Some(90.0), 7200).is_ok());
    }

    #[test]
    fn test_unknown_duration_allowed() {
        assert!(ensure_within_limit(None, 7200).is_ok());
    }
}
