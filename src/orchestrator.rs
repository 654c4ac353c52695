//! Ingestion orchestrator.
//!
//! Drives a session from PENDING to a terminal state:
//! `PENDING -> PROCESSING -> TRANSCRIBING -> CHUNKING -> COMPLETED`, with
//! FAILED reachable from any non-terminal state. Runs as a fire-and-forget
//! task per session; every outcome is observed through the persisted status,
//! never a return value.

use crate::chunking::{chunk_transcript, ChunkingPolicy};
use crate::error::Result;
use crate::store::{ClaimOutcome, PersistOutcome, ProcessingStatus, SessionStore};
use crate::transcription::{Transcriber, TranscriptionResult};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Retry policy for the transcription stage.
///
/// The observed behavior is a single retry with no backoff; this is kept
/// injectable rather than hardcoded so the policy can evolve without touching
/// the state machine.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first (must be >= 1).
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

/// The ingestion orchestrator.
pub struct Orchestrator {
    store: Arc<SessionStore>,
    transcriber: Arc<dyn Transcriber>,
    retry: RetryPolicy,
    chunking: ChunkingPolicy,
}

impl Orchestrator {
    /// Create an orchestrator with explicit dependencies.
    pub fn new(
        store: Arc<SessionStore>,
        transcriber: Arc<dyn Transcriber>,
        retry: RetryPolicy,
        chunking: ChunkingPolicy,
    ) -> Self {
        Self {
            store,
            transcriber,
            retry,
            chunking,
        }
    }

    /// Process one session to a terminal state.
    ///
    /// Never returns an error and never panics: failures are converted into a
    /// FAILED status write on an independent connection, and a session that
    /// vanished (deleted before or during processing) is a silent no-op.
    #[instrument(skip(self))]
    pub async fn process_session(&self, session_id: i64) {
        if let Err(e) = self.run_pipeline(session_id).await {
            error!("Error processing session {}: {}", session_id, e);
            if let Err(record_err) = self.store.record_failure(session_id, &e.to_string()) {
                // Nothing left to do but log; the scheduler must not see this.
                error!(
                    "Failed to record FAILED state for session {}: {}",
                    session_id, record_err
                );
            }
        }
    }

    async fn run_pipeline(&self, session_id: i64) -> Result<()> {
        let session = match self.store.claim_for_processing(session_id)? {
            ClaimOutcome::Claimed(s) => s,
            ClaimOutcome::AlreadyProcessed => return Ok(()),
            ClaimOutcome::Vanished => {
                info!("Session {} gone before processing, skipping", session_id);
                return Ok(());
            }
        };

        self.store
            .set_status(session_id, ProcessingStatus::Transcribing)?;
        let transcription = self.transcribe_with_retry(&session.source_url).await?;

        self.store
            .set_status(session_id, ProcessingStatus::Chunking)?;
        // Chunking is pure; any failure past this point comes from persistence
        // and is not retried.
        let chunks = chunk_transcript(
            &transcription.full_text,
            &transcription.segments,
            &self.chunking,
        );

        match self.store.persist_completion(
            session_id,
            &transcription.full_text,
            &transcription.language,
            &chunks,
        )? {
            PersistOutcome::Persisted => {
                info!(
                    "Session {} completed with {} chunks",
                    session_id,
                    chunks.len()
                );
            }
            PersistOutcome::Vanished => {
                info!("Session {} deleted mid-processing, nothing persisted", session_id);
            }
        }

        Ok(())
    }

    async fn transcribe_with_retry(&self, source_url: &str) -> Result<TranscriptionResult> {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            match self.transcriber.transcribe(source_url).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!(
                        "Transcription attempt {}/{} failed: {}",
                        attempt, attempts, e
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.expect("at least one attempt"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarkError;
    use crate::store::Session;
    use crate::transcription::TranscriptSegment;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

    static DB_COUNTER: AtomicU64 = AtomicU64::new(0);

    /// Transcriber fake: fails the first `failures` calls, then succeeds.
    struct FakeTranscriber {
        failures: u32,
        calls: AtomicU32,
        delay_ms: u64,
    }

    impl FakeTranscriber {
        fn succeeding() -> Self {
            Self {
                failures: 0,
                calls: AtomicU32::new(0),
                delay_ms: 10,
            }
        }

        fn failing_first(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                delay_ms: 0,
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transcriber for FakeTranscriber {
        async fn transcribe(&self, _source_url: &str) -> crate::error::Result<TranscriptionResult> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }
            if call < self.failures {
                return Err(HarkError::Transcription("provider unavailable".to_string()));
            }
            let segments = vec![
                TranscriptSegment::new(0.0, 30.0, "first part".to_string()),
                TranscriptSegment::new(30.0, 60.0, "second part".to_string()),
                TranscriptSegment::new(60.0, 90.0, "third part".to_string()),
            ];
            Ok(TranscriptionResult::from_segments("english".to_string(), segments))
        }
    }

    fn fixture(transcriber: Arc<FakeTranscriber>) -> (Arc<SessionStore>, Orchestrator, Session) {
        let name = format!("orch_test_{}", DB_COUNTER.fetch_add(1, Ordering::SeqCst));
        let store = Arc::new(SessionStore::in_memory(&name).unwrap());
        let subject = store.create_subject("Physics", None).unwrap();
        let user = store.create_user("Bo", "instructor", "bo@example.com").unwrap();
        let session = store
            .create_session(subject.subject_id, "https://example.com/u1", user.user_id)
            .unwrap();

        let orchestrator = Orchestrator::new(
            store.clone(),
            transcriber,
            RetryPolicy::default(),
            ChunkingPolicy::SegmentAware,
        );

        (store, orchestrator, session)
    }

    #[tokio::test]
    async fn test_successful_pipeline() {
        let transcriber = Arc::new(FakeTranscriber::succeeding());
        let (store, orchestrator, session) = fixture(transcriber.clone());

        orchestrator.process_session(session.session_id).await;

        let fetched = store.get_session(session.session_id).unwrap().unwrap();
        assert_eq!(fetched.processing_status, ProcessingStatus::Completed);
        assert!(fetched.duration.unwrap() > 0.0);
        assert!(fetched.failure_reason.is_none());

        let transcript = store.get_transcript(session.session_id).unwrap().unwrap();
        assert_eq!(transcript.language, "english");
        assert!(!transcript.full_text.is_empty());

        let chunks = store.get_chunks(session.session_id).unwrap();
        assert!(!chunks.is_empty());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i64);
        }
    }

    #[tokio::test]
    async fn test_retry_once_then_succeed() {
        let transcriber = Arc::new(FakeTranscriber::failing_first(1));
        let (store, orchestrator, session) = fixture(transcriber.clone());

        orchestrator.process_session(session.session_id).await;

        assert_eq!(transcriber.call_count(), 2);
        let fetched = store.get_session(session.session_id).unwrap().unwrap();
        assert_eq!(fetched.processing_status, ProcessingStatus::Completed);
    }

    #[tokio::test]
    async fn test_double_failure_marks_failed() {
        let transcriber = Arc::new(FakeTranscriber::failing_first(2));
        let (store, orchestrator, session) = fixture(transcriber.clone());

        orchestrator.process_session(session.session_id).await;

        // Exactly two attempts, then terminal failure
        assert_eq!(transcriber.call_count(), 2);
        let fetched = store.get_session(session.session_id).unwrap().unwrap();
        assert_eq!(fetched.processing_status, ProcessingStatus::Failed);
        assert!(!fetched.failure_reason.clone().unwrap().is_empty());
        assert!(!store.has_transcript(session.session_id).unwrap());
    }

    #[tokio::test]
    async fn test_double_invocation_is_idempotent() {
        let transcriber = Arc::new(FakeTranscriber::succeeding());
        let (store, orchestrator, session) = fixture(transcriber.clone());

        orchestrator.process_session(session.session_id).await;
        orchestrator.process_session(session.session_id).await;

        assert_eq!(transcriber.call_count(), 1);
        let chunks = store.get_chunks(session.session_id).unwrap();
        let indices: Vec<i64> = chunks.iter().map(|c| c.chunk_index).collect();
        let expected: Vec<i64> = (0..chunks.len() as i64).collect();
        assert_eq!(indices, expected);
    }

    #[tokio::test]
    async fn test_concurrent_invocations_single_transcript() {
        let transcriber = Arc::new(FakeTranscriber::succeeding());
        let (store, orchestrator, session) = fixture(transcriber.clone());
        let orchestrator = Arc::new(orchestrator);

        let a = {
            let orch = orchestrator.clone();
            let id = session.session_id;
            tokio::spawn(async move { orch.process_session(id).await })
        };
        let b = {
            let orch = orchestrator.clone();
            let id = session.session_id;
            tokio::spawn(async move { orch.process_session(id).await })
        };
        a.await.unwrap();
        b.await.unwrap();

        let transcript_count = if store.has_transcript(session.session_id).unwrap() {
            1
        } else {
            0
        };
        assert_eq!(transcript_count, 1);

        let chunks = store.get_chunks(session.session_id).unwrap();
        let indices: Vec<i64> = chunks.iter().map(|c| c.chunk_index).collect();
        let expected: Vec<i64> = (0..chunks.len() as i64).collect();
        assert_eq!(indices, expected, "duplicate or missing chunk indices");
    }

    #[tokio::test]
    async fn test_vanished_before_processing() {
        let transcriber = Arc::new(FakeTranscriber::succeeding());
        let (store, orchestrator, session) = fixture(transcriber.clone());

        store.delete_session(session.session_id).unwrap();
        orchestrator.process_session(session.session_id).await;

        assert_eq!(transcriber.call_count(), 0);
        assert!(store.get_session(session.session_id).unwrap().is_none());
        assert!(!store.has_transcript(session.session_id).unwrap());
    }

    #[tokio::test]
    async fn test_word_policy_pipeline() {
        let transcriber = Arc::new(FakeTranscriber::succeeding());
        let name = format!("orch_test_{}", DB_COUNTER.fetch_add(1, Ordering::SeqCst));
        let store = Arc::new(SessionStore::in_memory(&name).unwrap());
        let subject = store.create_subject("History", None).unwrap();
        let user = store.create_user("Cy", "instructor", "cy@example.com").unwrap();
        let session = store
            .create_session(subject.subject_id, "https://example.com/u2", user.user_id)
            .unwrap();

        let orchestrator = Orchestrator::new(
            store.clone(),
            transcriber,
            RetryPolicy::default(),
            ChunkingPolicy::FixedSize { words_per_chunk: 2 },
        );

        orchestrator.process_session(session.session_id).await;

        let chunks = store.get_chunks(session.session_id).unwrap();
        // six words of transcript, two per chunk
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].start_time, 0.0);
    }
}
