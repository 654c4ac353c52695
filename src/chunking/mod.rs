//! Transcript chunking.
//!
//! Pure functions that split a transcript into ordered, addressable chunks.
//! No I/O happens here; the orchestrator feeds in the transcription output
//! and persists whatever comes back.

use crate::transcription::TranscriptSegment;
use serde::{Deserialize, Serialize};

/// Target number of chunks the segment-aware policy aims for.
const TARGET_CHUNKS: usize = 5;

/// A contiguous slice of a transcript, the atomic unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptChunk {
    /// Zero-based position in narrative (reading) order.
    pub chunk_index: i64,
    /// Chunk text.
    pub text: String,
    /// Start time in seconds (0.0 when timing is unknown).
    pub start_time: f64,
    /// End time in seconds (0.0 when timing is unknown).
    pub end_time: f64,
}

/// Chunking policy, selected by whether timing metadata is present.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkingPolicy {
    /// Group time-aligned segments, targeting at least five chunks.
    SegmentAware,
    /// Split plain text into fixed-size word groups.
    FixedSize { words_per_chunk: usize },
}

impl ChunkingPolicy {
    /// Resolve a policy from its configuration name.
    pub fn from_name(name: &str, words_per_chunk: usize) -> Self {
        match name.to_lowercase().as_str() {
            "words" => ChunkingPolicy::FixedSize { words_per_chunk },
            _ => ChunkingPolicy::SegmentAware,
        }
    }
}

/// Split a transcript into ordered chunks with contiguous indices from 0.
pub fn chunk_transcript(
    full_text: &str,
    segments: &[TranscriptSegment],
    policy: &ChunkingPolicy,
) -> Vec<TranscriptChunk> {
    match policy {
        ChunkingPolicy::SegmentAware => chunk_by_segments(full_text, segments),
        ChunkingPolicy::FixedSize { words_per_chunk } => {
            chunk_by_words(full_text, *words_per_chunk)
        }
    }
}

/// Group consecutive segments into chunks, targeting at least five chunks
/// for typical inputs.
///
/// The group size is `max(1, segment_count / 5)`. A group closes once it
/// reaches that size while fewer than four chunks have been emitted, or at
/// the final segment; everything after the fourth chunk accumulates into the
/// tail chunk. Inputs with fewer than five segments legitimately produce
/// fewer chunks.
fn chunk_by_segments(full_text: &str, segments: &[TranscriptSegment]) -> Vec<TranscriptChunk> {
    if segments.is_empty() {
        // Timing is unknown, not an error: one chunk spanning the whole text.
        return vec![TranscriptChunk {
            chunk_index: 0,
            text: full_text.to_string(),
            start_time: 0.0,
            end_time: 0.0,
        }];
    }

    let group_size = std::cmp::max(1, segments.len() / TARGET_CHUNKS);

    let mut chunks = Vec::new();
    let mut current: Vec<&TranscriptSegment> = Vec::new();
    let mut chunk_index: i64 = 0;

    for (i, seg) in segments.iter().enumerate() {
        current.push(seg);

        let is_last = i == segments.len() - 1;
        if (current.len() >= group_size && chunk_index < (TARGET_CHUNKS as i64 - 1)) || is_last {
            let text = current
                .iter()
                .map(|s| s.text.trim())
                .collect::<Vec<_>>()
                .join(" ");
            let start_time = current.first().map(|s| s.start_seconds).unwrap_or(0.0);
            let end_time = current.last().map(|s| s.end_seconds).unwrap_or(start_time);

            chunks.push(TranscriptChunk {
                chunk_index,
                text,
                start_time,
                end_time,
            });

            chunk_index += 1;
            current.clear();
        }
    }

    chunks
}

/// Split the text by whitespace into groups of `words_per_chunk` words, the
/// final group taking the remainder. Start/end times are unavailable under
/// this policy. Text with no words produces no chunks.
fn chunk_by_words(full_text: &str, words_per_chunk: usize) -> Vec<TranscriptChunk> {
    let words: Vec<&str> = full_text.split_whitespace().collect();
    let per_chunk = std::cmp::max(1, words_per_chunk);

    words
        .chunks(per_chunk)
        .enumerate()
        .map(|(i, group)| TranscriptChunk {
            chunk_index: i as i64,
            text: group.join(" "),
            start_time: 0.0,
            end_time: 0.0,
        })
        .collect()
}
