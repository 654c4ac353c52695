//! Audio download utilities.
//!
//! Fetches audio for a media source URL using yt-dlp so it can be handed to
//! the transcription provider.

use crate::error::{HarkError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, instrument};

/// Downloads audio from a source URL and saves it as MP3.
///
/// Uses yt-dlp to download and extract audio into `output_dir`. The file is
/// named after `tag` (callers typically pass the session id).
#[instrument(skip(output_dir), fields(tag = %tag))]
pub async fn download_audio(url: &str, tag: &str, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let target_path = output_dir.join(format!("{}.mp3", tag));

    info!("Downloading audio from {}", url);

    let template = output_dir.join(format!("{}.%(ext)s", tag));

    let result = Command::new("yt-dlp")
        .arg("--extract-audio")
        .arg("--audio-format").arg("mp3")
        .arg("--audio-quality").arg("0")
        .arg("--output").arg(template.to_str().unwrap_or_default())
        .arg("--no-playlist")
        .arg("--quiet")
        .arg("--no-warnings")
        .arg(url)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await;

    let output = match result {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(HarkError::ToolNotFound("yt-dlp".into()));
        }
        Err(e) => {
            return Err(HarkError::AudioDownload(format!("yt-dlp execution failed: {e}")));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(HarkError::AudioDownload(format!("yt-dlp failed: {stderr}")));
    }

    if target_path.exists() {
        return Ok(target_path);
    }

    // yt-dlp occasionally keeps the container extension; take whatever it
    // produced for this tag.
    find_audio_file(output_dir, tag)
}

/// Probe the media duration in seconds without downloading.
///
/// Uses yt-dlp's metadata printer. Sources without a reported duration (live
/// streams, some direct files) yield `None`; callers decide whether to
/// proceed.
#[instrument]
pub async fn probe_duration(url: &str) -> Result<Option<f64>> {
    let result = Command::new("yt-dlp")
        .arg("--skip-download")
        .arg("--print").arg("duration")
        .arg("--no-playlist")
        .arg("--quiet")
        .arg("--no-warnings")
        .arg(url)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    let output = match result {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(HarkError::ToolNotFound("yt-dlp".into()));
        }
        Err(e) => {
            return Err(HarkError::AudioDownload(format!("yt-dlp execution failed: {e}")));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(HarkError::AudioDownload(format!("yt-dlp failed: {stderr}")));
    }

    Ok(parse_probed_duration(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse yt-dlp's printed duration. `NA` and garbage both mean unknown.
fn parse_probed_duration(stdout: &str) -> Option<f64> {
    stdout.trim().parse::<f64>().ok().filter(|d| *d >= 0.0)
}

/// Locates a downloaded audio file by tag.
fn find_audio_file(dir: &Path, tag: &str) -> Result<PathBuf> {
    for ext in &["mp3", "opus", "m4a", "webm", "ogg"] {
        let candidate = dir.join(format!("{}.{}", tag, ext));
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let entries = std::fs::read_dir(dir)
        .map_err(|e| HarkError::AudioDownload(format!("Cannot read directory: {e}")))?;

    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(tag) {
            return Ok(entry.path());
        }
    }

    Err(HarkError::AudioDownload("Audio file not found after download".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probed_duration() {
        assert_eq!(parse_probed_duration("4821.0\n"), Some(4821.0));
        assert_eq!(parse_probed_duration("613"), Some(613.0));
        assert_eq!(parse_probed_duration("NA\n"), None);
        assert_eq!(parse_probed_duration(""), None);
        assert_eq!(parse_probed_duration("-5"), None);
    }

    #[test]
    fn test_find_audio_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let result = find_audio_file(dir.path(), "absent");
        assert!(result.is_err());
    }

    #[test]
    fn test_find_audio_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("42.m4a"), b"x").unwrap();
        let found = find_audio_file(dir.path(), "42").unwrap();
        assert!(found.ends_with("42.m4a"));
    }
}
