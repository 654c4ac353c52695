//! SQLite-backed session store.
//!
//! The store is the single source of truth for sessions, transcripts and
//! chunks, and arbitrates concurrent access. SQLite has no row-level
//! `SELECT ... FOR UPDATE`, so the claim step runs inside an IMMEDIATE
//! transaction, which takes the write lock up front and makes the
//! status/transcript inspection and the `PENDING -> PROCESSING` transition
//! atomic.

use crate::chunking::TranscriptChunk;
use crate::error::{HarkError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

/// Processing status of an ingestion session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Transcribing,
    Chunking,
    Completed,
    Failed,
}

impl ProcessingStatus {
    /// Whether this status is terminal (no further transitions occur).
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessingStatus::Pending => "PENDING",
            ProcessingStatus::Processing => "PROCESSING",
            ProcessingStatus::Transcribing => "TRANSCRIBING",
            ProcessingStatus::Chunking => "CHUNKING",
            ProcessingStatus::Completed => "COMPLETED",
            ProcessingStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ProcessingStatus::Pending),
            "PROCESSING" => Ok(ProcessingStatus::Processing),
            "TRANSCRIBING" => Ok(ProcessingStatus::Transcribing),
            "CHUNKING" => Ok(ProcessingStatus::Chunking),
            "COMPLETED" => Ok(ProcessingStatus::Completed),
            "FAILED" => Ok(ProcessingStatus::Failed),
            _ => Err(format!("Unknown processing status: {}", s)),
        }
    }
}

/// A subject owning sessions (seed data only; no CRUD surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub subject_id: i64,
    pub subject_name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A user who submits sessions (seed data only; no CRUD surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub name: String,
    pub role: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// One ingestion session: a single source tracked from submission through
/// transcription and chunking to a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: i64,
    pub subject_id: i64,
    pub source_url: String,
    pub uploaded_by: i64,
    pub processing_status: ProcessingStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Processing duration in seconds, derived at completion.
    pub duration: Option<f64>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A persisted transcript (at most one per session).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptRow {
    pub transcript_id: i64,
    pub session_id: i64,
    pub full_text: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRow {
    pub chunk_id: i64,
    pub session_id: i64,
    pub subject_id: i64,
    pub chunk_text: String,
    pub start_time: f64,
    pub end_time: f64,
    pub chunk_index: i64,
}

/// Outcome of attempting to claim a session for processing.
#[derive(Debug)]
pub enum ClaimOutcome {
    /// The session was transitioned to PROCESSING and belongs to this caller.
    Claimed(Session),
    /// The session is already COMPLETED or already has a transcript.
    AlreadyProcessed,
    /// The row no longer exists (deleted before scheduling ran).
    Vanished,
}

/// Outcome of the atomic persistence stage.
#[derive(Debug, PartialEq, Eq)]
pub enum PersistOutcome {
    Persisted,
    /// The session was deleted mid-processing; nothing was written.
    Vanished,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS subjects (
    subject_id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_name TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    role TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    session_id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id INTEGER NOT NULL REFERENCES subjects(subject_id),
    source_url TEXT NOT NULL UNIQUE,
    uploaded_by INTEGER NOT NULL REFERENCES users(user_id),
    processing_status TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    duration REAL,
    failure_reason TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS transcripts (
    transcript_id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL UNIQUE REFERENCES sessions(session_id) ON DELETE CASCADE,
    full_text TEXT NOT NULL,
    language TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    chunk_id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
    subject_id INTEGER NOT NULL,
    chunk_text TEXT NOT NULL,
    start_time REAL NOT NULL,
    end_time REAL NOT NULL,
    chunk_index INTEGER NOT NULL,
    UNIQUE(session_id, chunk_index)
);

CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(processing_status);
CREATE INDEX IF NOT EXISTS idx_chunks_session ON chunks(session_id);
"#;

/// SQLite-backed session store.
pub struct SessionStore {
    conn: Mutex<Connection>,
    uri: String,
    flags: OpenFlags,
}

impl SessionStore {
    /// Open (or create) a store at the given path.
    #[instrument(skip_all)]
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let uri = path.to_string_lossy().to_string();
        let flags = OpenFlags::default();
        let conn = Connection::open_with_flags(&uri, flags)?;
        Self::init_connection(&conn)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized session store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
            uri,
            flags,
        })
    }

    /// Open a named in-memory store with a shared cache, so that fresh
    /// connections (used by the failure handler) see the same data. Useful
    /// for testing.
    pub fn in_memory(name: &str) -> Result<Self> {
        let uri = format!("file:{}?mode=memory&cache=shared", name);
        let flags = OpenFlags::default() | OpenFlags::SQLITE_OPEN_URI;
        let conn = Connection::open_with_flags(&uri, flags)?;
        Self::init_connection(&conn)?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            uri,
            flags,
        })
    }

    fn init_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(())
    }

    /// Open an independent connection to the same database. The failure
    /// handler uses this because the primary connection may hold a poisoned
    /// transaction after an error.
    pub fn fresh_connection(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(&self.uri, self.flags)?;
        Self::init_connection(&conn)?;
        Ok(conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| HarkError::Store(format!("Failed to acquire lock: {}", e)))
    }

    // ========================================================================
    // Seed data
    // ========================================================================

    /// Create a subject.
    pub fn create_subject(&self, name: &str, description: Option<&str>) -> Result<Subject> {
        let conn = self.lock()?;
        let created_at = Utc::now();

        conn.execute(
            "INSERT INTO subjects (subject_name, description, created_at) VALUES (?1, ?2, ?3)",
            params![name, description, created_at.to_rfc3339()],
        )?;

        Ok(Subject {
            subject_id: conn.last_insert_rowid(),
            subject_name: name.to_string(),
            description: description.map(|s| s.to_string()),
            created_at,
        })
    }

    /// Create a user.
    pub fn create_user(&self, name: &str, role: &str, email: &str) -> Result<User> {
        let conn = self.lock()?;
        let created_at = Utc::now();

        conn.execute(
            "INSERT INTO users (name, role, email, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![name, role, email, created_at.to_rfc3339()],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                HarkError::Conflict(format!("User with email {} already exists", email))
            }
            other => other.into(),
        })?;

        Ok(User {
            user_id: conn.last_insert_rowid(),
            name: name.to_string(),
            role: role.to_string(),
            email: email.to_string(),
            created_at,
        })
    }

    /// Seed a default subject and user when the tables are empty, so that
    /// sessions can be created right after `init`. Returns whether anything
    /// was inserted.
    pub fn seed_defaults(&self) -> Result<bool> {
        let empty = {
            let conn = self.lock()?;
            let subjects: i64 =
                conn.query_row("SELECT COUNT(*) FROM subjects", [], |row| row.get(0))?;
            let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            subjects == 0 && users == 0
        };

        if !empty {
            return Ok(false);
        }

        self.create_subject("General", Some("Default subject"))?;
        self.create_user("Default User", "instructor", "default@hark.local")?;
        Ok(true)
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Create a session in the PENDING state.
    ///
    /// Fails with `NotFound` for an unknown subject or user and `Conflict`
    /// for a source URL that already has a session. The UNIQUE constraint is
    /// the backstop for races between the existence check and the insert.
    #[instrument(skip(self))]
    pub fn create_session(
        &self,
        subject_id: i64,
        source_url: &str,
        uploaded_by: i64,
    ) -> Result<Session> {
        let conn = self.lock()?;

        let subject_exists: bool = conn.query_row(
            "SELECT COUNT(*) FROM subjects WHERE subject_id = ?1",
            params![subject_id],
            |row| row.get::<_, i64>(0).map(|c| c > 0),
        )?;
        if !subject_exists {
            return Err(HarkError::NotFound("Subject not found".to_string()));
        }

        let user_exists: bool = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE user_id = ?1",
            params![uploaded_by],
            |row| row.get::<_, i64>(0).map(|c| c > 0),
        )?;
        if !user_exists {
            return Err(HarkError::NotFound("User not found".to_string()));
        }

        let duplicate: bool = conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE source_url = ?1",
            params![source_url],
            |row| row.get::<_, i64>(0).map(|c| c > 0),
        )?;
        if duplicate {
            return Err(HarkError::Conflict(format!(
                "Session with source URL {} already exists",
                source_url
            )));
        }

        let created_at = Utc::now();
        conn.execute(
            r#"
            INSERT INTO sessions (subject_id, source_url, uploaded_by, processing_status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                subject_id,
                source_url,
                uploaded_by,
                ProcessingStatus::Pending.to_string(),
                created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                HarkError::Conflict(format!(
                    "Session with source URL {} already exists",
                    source_url
                ))
            }
            other => other.into(),
        })?;

        let session_id = conn.last_insert_rowid();
        debug!("Created session {} for {}", session_id, source_url);

        Ok(Session {
            session_id,
            subject_id,
            source_url: source_url.to_string(),
            uploaded_by,
            processing_status: ProcessingStatus::Pending,
            started_at: None,
            completed_at: None,
            duration: None,
            failure_reason: None,
            created_at,
        })
    }

    /// Fetch a session by id.
    pub fn get_session(&self, session_id: i64) -> Result<Option<Session>> {
        let conn = self.lock()?;
        Self::select_session(&conn, session_id)
    }

    /// List all sessions, newest first.
    pub fn list_sessions(&self) -> Result<Vec<Session>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sessions ORDER BY created_at DESC",
            SESSION_COLUMNS
        ))?;

        let rows = stmt.query_map([], row_to_session)?;
        let sessions = rows.filter_map(|r| r.ok()).collect();
        Ok(sessions)
    }

    /// Delete a session. Transcripts and chunks cascade.
    ///
    /// This is an external operation as far as the ingestion pipeline is
    /// concerned; the orchestrator tolerates the row vanishing at any stage.
    pub fn delete_session(&self, session_id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(deleted > 0)
    }

    // ========================================================================
    // Orchestration
    // ========================================================================

    /// Claim a session for processing.
    ///
    /// Runs in an IMMEDIATE transaction so concurrent claims for the same id
    /// serialize. Re-checks the terminal status and transcript existence
    /// inside the transaction before transitioning `PENDING -> PROCESSING`
    /// and recording `started_at`. The commit happens before this function
    /// returns, so status polls see PROCESSING before transcription begins.
    #[instrument(skip(self))]
    pub fn claim_for_processing(&self, session_id: i64) -> Result<ClaimOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let session = match Self::select_session(&tx, session_id)? {
            Some(s) => s,
            None => return Ok(ClaimOutcome::Vanished),
        };

        if session.processing_status == ProcessingStatus::Completed {
            info!("Session {} already COMPLETED, skipping", session_id);
            return Ok(ClaimOutcome::AlreadyProcessed);
        }

        // Conditional claim: only a PENDING session can be taken. An in-flight
        // status means another orchestration attempt owns the row.
        if session.processing_status != ProcessingStatus::Pending {
            info!(
                "Session {} is {} and not claimable, skipping",
                session_id, session.processing_status
            );
            return Ok(ClaimOutcome::AlreadyProcessed);
        }

        let has_transcript: bool = tx.query_row(
            "SELECT COUNT(*) FROM transcripts WHERE session_id = ?1",
            params![session_id],
            |row| row.get::<_, i64>(0).map(|c| c > 0),
        )?;
        if has_transcript {
            info!("Transcript already exists for session {}, skipping", session_id);
            return Ok(ClaimOutcome::AlreadyProcessed);
        }

        let started_at = Utc::now();
        tx.execute(
            "UPDATE sessions SET processing_status = ?1, started_at = ?2 WHERE session_id = ?3",
            params![
                ProcessingStatus::Processing.to_string(),
                started_at.to_rfc3339(),
                session_id,
            ],
        )?;
        tx.commit()?;

        info!("Session {} moved to PROCESSING", session_id);

        Ok(ClaimOutcome::Claimed(Session {
            processing_status: ProcessingStatus::Processing,
            started_at: Some(started_at),
            ..session
        }))
    }

    /// Record an intermediate status transition (TRANSCRIBING, CHUNKING).
    #[instrument(skip(self))]
    pub fn set_status(&self, session_id: i64, status: ProcessingStatus) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE sessions SET processing_status = ?1 WHERE session_id = ?2",
            params![status.to_string(), session_id],
        )?;
        info!("Session {} moved to {}", session_id, status);
        Ok(())
    }

    /// Persist the transcript and chunk batch and mark the session COMPLETED,
    /// all in one transaction.
    ///
    /// The session is re-fetched inside the transaction; if it vanished
    /// (deleted mid-processing) the transaction rolls back and nothing is
    /// written.
    #[instrument(skip(self, full_text, chunks), fields(chunk_count = chunks.len()))]
    pub fn persist_completion(
        &self,
        session_id: i64,
        full_text: &str,
        language: &str,
        chunks: &[TranscriptChunk],
    ) -> Result<PersistOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let session = match Self::select_session(&tx, session_id)? {
            Some(s) => s,
            None => {
                warn!(
                    "Session {} was deleted mid-processing, aborting persistence",
                    session_id
                );
                return Ok(PersistOutcome::Vanished);
            }
        };

        let now = Utc::now();
        tx.execute(
            r#"
            INSERT INTO transcripts (session_id, full_text, language, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![session_id, full_text, language, now.to_rfc3339()],
        )?;

        for chunk in chunks {
            tx.execute(
                r#"
                INSERT INTO chunks (session_id, subject_id, chunk_text, start_time, end_time, chunk_index)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    session_id,
                    session.subject_id,
                    chunk.text,
                    chunk.start_time,
                    chunk.end_time,
                    chunk.chunk_index,
                ],
            )?;
        }

        let duration = session
            .started_at
            .map(|s| (now - s).num_microseconds().unwrap_or(0) as f64 / 1_000_000.0);

        tx.execute(
            r#"
            UPDATE sessions
            SET processing_status = ?1, completed_at = ?2, duration = ?3
            WHERE session_id = ?4
            "#,
            params![
                ProcessingStatus::Completed.to_string(),
                now.to_rfc3339(),
                duration,
                session_id,
            ],
        )?;
        tx.commit()?;

        info!("Session {} moved to COMPLETED", session_id);
        Ok(PersistOutcome::Persisted)
    }

    /// Record a terminal failure on an independent connection.
    ///
    /// The primary connection may be mid-transaction after the error that
    /// brought us here, so a fresh one is used. Missing rows are a no-op.
    #[instrument(skip(self, reason))]
    pub fn record_failure(&self, session_id: i64, reason: &str) -> Result<()> {
        let conn = self.fresh_connection()?;

        let session = match Self::select_session(&conn, session_id)? {
            Some(s) => s,
            None => return Ok(()),
        };

        let now = Utc::now();
        let duration = session
            .started_at
            .map(|s| (now - s).num_microseconds().unwrap_or(0) as f64 / 1_000_000.0);

        conn.execute(
            r#"
            UPDATE sessions
            SET processing_status = ?1, failure_reason = ?2, completed_at = ?3, duration = ?4
            WHERE session_id = ?5
            "#,
            params![
                ProcessingStatus::Failed.to_string(),
                reason,
                now.to_rfc3339(),
                duration,
                session_id,
            ],
        )?;

        warn!("Session {} moved to FAILED: {}", session_id, reason);
        Ok(())
    }

    // ========================================================================
    // Transcripts and chunks
    // ========================================================================

    /// Fetch the transcript for a session, if present.
    pub fn get_transcript(&self, session_id: i64) -> Result<Option<TranscriptRow>> {
        let conn = self.lock()?;

        let result = conn.query_row(
            r#"
            SELECT transcript_id, session_id, full_text, language, created_at
            FROM transcripts WHERE session_id = ?1
            "#,
            params![session_id],
            |row| {
                let created_at_str: String = row.get(4)?;
                Ok(TranscriptRow {
                    transcript_id: row.get(0)?,
                    session_id: row.get(1)?,
                    full_text: row.get(2)?,
                    language: row.get(3)?,
                    created_at: parse_timestamp(&created_at_str),
                })
            },
        );

        match result {
            Ok(t) => Ok(Some(t)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a transcript exists for a session.
    pub fn has_transcript(&self, session_id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transcripts WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Fetch a session's chunks in narrative order.
    pub fn get_chunks(&self, session_id: i64) -> Result<Vec<ChunkRow>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT chunk_id, session_id, subject_id, chunk_text, start_time, end_time, chunk_index
            FROM chunks
            WHERE session_id = ?1
            ORDER BY chunk_index
            "#,
        )?;

        let rows = stmt.query_map(params![session_id], |row| {
            Ok(ChunkRow {
                chunk_id: row.get(0)?,
                session_id: row.get(1)?,
                subject_id: row.get(2)?,
                chunk_text: row.get(3)?,
                start_time: row.get(4)?,
                end_time: row.get(5)?,
                chunk_index: row.get(6)?,
            })
        })?;

        let chunks: Vec<ChunkRow> = rows.filter_map(|r| r.ok()).collect();
        debug!("Found {} chunks for session {}", chunks.len(), session_id);
        Ok(chunks)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn select_session(conn: &Connection, session_id: i64) -> Result<Option<Session>> {
        let result = conn.query_row(
            &format!(
                "SELECT {} FROM sessions WHERE session_id = ?1",
                SESSION_COLUMNS
            ),
            params![session_id],
            row_to_session,
        );

        match result {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

const SESSION_COLUMNS: &str = "session_id, subject_id, source_url, uploaded_by, \
     processing_status, started_at, completed_at, duration, failure_reason, created_at";

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let status_str: String = row.get(4)?;
    let started_at_str: Option<String> = row.get(5)?;
    let completed_at_str: Option<String> = row.get(6)?;
    let created_at_str: String = row.get(9)?;

    Ok(Session {
        session_id: row.get(0)?,
        subject_id: row.get(1)?,
        source_url: row.get(2)?,
        uploaded_by: row.get(3)?,
        processing_status: status_str
            .parse()
            .unwrap_or(ProcessingStatus::Failed),
        started_at: started_at_str.as_deref().map(parse_timestamp),
        completed_at: completed_at_str.as_deref().map(parse_timestamp),
        duration: row.get(7)?,
        failure_reason: row.get(8)?,
        created_at: parse_timestamp(&created_at_str),
    })
}

// A malformed stored timestamp maps to the Unix epoch rather than the
// current time, so corrupted rows stand out instead of looking fresh.
fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            warn!("Malformed stored timestamp {:?}, substituting epoch", s);
            DateTime::<Utc>::UNIX_EPOCH
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static DB_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn store() -> SessionStore {
        let name = format!("store_test_{}", DB_COUNTER.fetch_add(1, Ordering::SeqCst));
        SessionStore::in_memory(&name).unwrap()
    }

    fn seeded(store: &SessionStore) -> (Subject, User) {
        let subject = store.create_subject("Algorithms", Some("CS lectures")).unwrap();
        let user = store
            .create_user("Ada", "instructor", "ada@example.com")
            .unwrap();
        (subject, user)
    }

    fn sample_chunks(n: usize) -> Vec<TranscriptChunk> {
        (0..n)
            .map(|i| TranscriptChunk {
                chunk_index: i as i64,
                text: format!("chunk {}", i),
                start_time: i as f64 * 10.0,
                end_time: (i + 1) as f64 * 10.0,
            })
            .collect()
    }

    #[test]
    fn test_seed_defaults_once() {
        let store = store();
        assert!(store.seed_defaults().unwrap());
        // Second call is a no-op
        assert!(!store.seed_defaults().unwrap());
        // Seeded IDs are usable immediately
        store
            .create_session(1, "https://example.com/seeded", 1)
            .unwrap();
    }

    #[test]
    fn test_create_session_pending() {
        let store = store();
        let (subject, user) = seeded(&store);

        let session = store
            .create_session(subject.subject_id, "https://example.com/v1", user.user_id)
            .unwrap();

        assert_eq!(session.processing_status, ProcessingStatus::Pending);
        assert!(session.started_at.is_none());
        assert!(session.failure_reason.is_none());
    }

    #[test]
    fn test_duplicate_url_conflict() {
        let store = store();
        let (subject, user) = seeded(&store);

        store
            .create_session(subject.subject_id, "https://example.com/v1", user.user_id)
            .unwrap();
        let err = store
            .create_session(subject.subject_id, "https://example.com/v1", user.user_id)
            .unwrap_err();

        assert!(matches!(err, HarkError::Conflict(_)));
        assert_eq!(store.list_sessions().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_subject_and_user() {
        let store = store();
        let (subject, user) = seeded(&store);

        let err = store
            .create_session(999, "https://example.com/v1", user.user_id)
            .unwrap_err();
        assert!(matches!(err, HarkError::NotFound(_)));

        let err = store
            .create_session(subject.subject_id, "https://example.com/v1", 999)
            .unwrap_err();
        assert!(matches!(err, HarkError::NotFound(_)));
    }

    #[test]
    fn test_claim_transitions_to_processing() {
        let store = store();
        let (subject, user) = seeded(&store);
        let session = store
            .create_session(subject.subject_id, "https://example.com/v1", user.user_id)
            .unwrap();

        let outcome = store.claim_for_processing(session.session_id).unwrap();
        let claimed = match outcome {
            ClaimOutcome::Claimed(s) => s,
            other => panic!("expected Claimed, got {:?}", other),
        };
        assert_eq!(claimed.processing_status, ProcessingStatus::Processing);
        assert!(claimed.started_at.is_some());

        let fetched = store.get_session(session.session_id).unwrap().unwrap();
        assert_eq!(fetched.processing_status, ProcessingStatus::Processing);
    }

    #[test]
    fn test_claim_vanished_session() {
        let store = store();
        let outcome = store.claim_for_processing(12345).unwrap();
        assert!(matches!(outcome, ClaimOutcome::Vanished));
    }

    #[test]
    fn test_claim_skips_completed() {
        let store = store();
        let (subject, user) = seeded(&store);
        let session = store
            .create_session(subject.subject_id, "https://example.com/v1", user.user_id)
            .unwrap();

        store.claim_for_processing(session.session_id).unwrap();
        store
            .persist_completion(session.session_id, "text", "english", &sample_chunks(2))
            .unwrap();

        let outcome = store.claim_for_processing(session.session_id).unwrap();
        assert!(matches!(outcome, ClaimOutcome::AlreadyProcessed));
    }

    #[test]
    fn test_claim_skips_in_flight() {
        let store = store();
        let (subject, user) = seeded(&store);
        let session = store
            .create_session(subject.subject_id, "https://example.com/v1", user.user_id)
            .unwrap();

        store.claim_for_processing(session.session_id).unwrap();
        // A second claim while the first is mid-flight must not take the row.
        let outcome = store.claim_for_processing(session.session_id).unwrap();
        assert!(matches!(outcome, ClaimOutcome::AlreadyProcessed));
    }

    #[test]
    fn test_persist_completion() {
        let store = store();
        let (subject, user) = seeded(&store);
        let session = store
            .create_session(subject.subject_id, "https://example.com/v1", user.user_id)
            .unwrap();
        store.claim_for_processing(session.session_id).unwrap();

        let outcome = store
            .persist_completion(session.session_id, "full text", "english", &sample_chunks(3))
            .unwrap();
        assert_eq!(outcome, PersistOutcome::Persisted);

        let fetched = store.get_session(session.session_id).unwrap().unwrap();
        assert_eq!(fetched.processing_status, ProcessingStatus::Completed);
        assert!(fetched.completed_at.is_some());

        let transcript = store.get_transcript(session.session_id).unwrap().unwrap();
        assert_eq!(transcript.full_text, "full text");

        let chunks = store.get_chunks(session.session_id).unwrap();
        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i64);
            assert_eq!(chunk.subject_id, subject.subject_id);
        }
    }

    #[test]
    fn test_persist_vanished_writes_nothing() {
        let store = store();
        let (subject, user) = seeded(&store);
        let session = store
            .create_session(subject.subject_id, "https://example.com/v1", user.user_id)
            .unwrap();
        store.claim_for_processing(session.session_id).unwrap();
        store.delete_session(session.session_id).unwrap();

        let outcome = store
            .persist_completion(session.session_id, "text", "english", &sample_chunks(2))
            .unwrap();
        assert_eq!(outcome, PersistOutcome::Vanished);
        assert!(!store.has_transcript(session.session_id).unwrap());
        assert!(store.get_chunks(session.session_id).unwrap().is_empty());
    }

    #[test]
    fn test_record_failure() {
        let store = store();
        let (subject, user) = seeded(&store);
        let session = store
            .create_session(subject.subject_id, "https://example.com/v1", user.user_id)
            .unwrap();
        store.claim_for_processing(session.session_id).unwrap();

        store
            .record_failure(session.session_id, "provider exploded")
            .unwrap();

        let fetched = store.get_session(session.session_id).unwrap().unwrap();
        assert_eq!(fetched.processing_status, ProcessingStatus::Failed);
        assert_eq!(fetched.failure_reason.as_deref(), Some("provider exploded"));
        assert!(fetched.completed_at.is_some());
    }

    #[test]
    fn test_record_failure_missing_session_noop() {
        let store = store();
        store.record_failure(424242, "whatever").unwrap();
    }

    #[test]
    fn test_cascade_delete() {
        let store = store();
        let (subject, user) = seeded(&store);
        let session = store
            .create_session(subject.subject_id, "https://example.com/v1", user.user_id)
            .unwrap();
        store.claim_for_processing(session.session_id).unwrap();
        store
            .persist_completion(session.session_id, "text", "english", &sample_chunks(2))
            .unwrap();

        assert!(store.delete_session(session.session_id).unwrap());
        assert!(!store.has_transcript(session.session_id).unwrap());
        assert!(store.get_chunks(session.session_id).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_timestamp_maps_to_epoch() {
        let store = store();
        let (subject, user) = seeded(&store);
        let session = store
            .create_session(subject.subject_id, "https://example.com/v1", user.user_id)
            .unwrap();

        let conn = store.fresh_connection().unwrap();
        conn.execute(
            "UPDATE sessions SET created_at = 'not-a-timestamp' WHERE session_id = ?1",
            params![session.session_id],
        )
        .unwrap();

        let fetched = store.get_session(session.session_id).unwrap().unwrap();
        assert_eq!(fetched.created_at, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            ProcessingStatus::Pending,
            ProcessingStatus::Processing,
            ProcessingStatus::Transcribing,
            ProcessingStatus::Chunking,
            ProcessingStatus::Completed,
            ProcessingStatus::Failed,
        ] {
            let parsed: ProcessingStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!(ProcessingStatus::Completed.is_terminal());
        assert!(!ProcessingStatus::Chunking.is_terminal());
    }
}
