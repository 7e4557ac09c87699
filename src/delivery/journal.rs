//! SQLite journal of delivery outcomes.
//!
//! One row per delivery request, written when the request finishes. The
//! artifact digest ties a row to the archived file even if it is renamed.

use std::fs;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{BoothError, Result};

use super::{DeliveryKind, DeliveryReport, DeliveryRequest, DeliveryStatus};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS deliveries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id TEXT NOT NULL UNIQUE,
    session_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    recipient TEXT,
    artifact_path TEXT NOT NULL,
    artifact_sha256 TEXT,
    status TEXT NOT NULL,
    reason TEXT,
    attempts INTEGER NOT NULL,
    requested_at TEXT NOT NULL,
    finished_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_deliveries_session ON deliveries(session_id);
CREATE INDEX IF NOT EXISTS idx_deliveries_finished ON deliveries(finished_at);
"#;

/// One journal row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalEntry {
    pub request: Uuid,
    pub session: Uuid,
    /// `email` or `print`.
    pub kind: String,
    pub recipient: Option<String>,
    pub artifact_path: String,
    pub artifact_sha256: Option<String>,
    /// `sent` or `failed`.
    pub status: String,
    pub reason: Option<String>,
    pub attempts: u32,
    pub requested_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JournalEntry {
    pub fn from_report(request: &DeliveryRequest, report: &DeliveryReport) -> Self {
        let recipient = match &request.kind {
            DeliveryKind::Email { recipient } => Some(recipient.clone()),
            DeliveryKind::Print => None,
        };
        let (status, reason) = match &report.status {
            DeliveryStatus::Sent => ("sent", None),
            DeliveryStatus::Failed { reason } => ("failed", Some(reason.clone())),
        };
        Self {
            request: request.id,
            session: request.session,
            kind: request.kind.name().to_string(),
            recipient,
            artifact_path: request.artifact.path.display().to_string(),
            artifact_sha256: digest_file(&request.artifact.path),
            status: status.to_string(),
            reason,
            attempts: report.attempts,
            requested_at: request.requested_at,
            finished_at: Utc::now(),
        }
    }
}

/// Hex SHA-256 of a file, or `None` if it cannot be read.
pub fn digest_file(path: &Path) -> Option<String> {
    let mut file = fs::File::open(path).ok()?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).ok()?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Some(hex::encode(hasher.finalize()))
}

fn journal_err(context: &str, e: &rusqlite::Error) -> BoothError {
    BoothError::Journal(format!("{context}: {e}"))
}

/// Delivery journal database.
pub struct Journal {
    conn: Connection,
}

impl Journal {
    /// Open or create the journal.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                BoothError::Journal(format!(
                    "Failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        debug!(path = %path.display(), "Opening delivery journal");
        let conn = Connection::open(path).map_err(|e| journal_err("Failed to open journal", &e))?;
        let journal = Self { conn };
        journal.init_schema()?;
        info!(path = %path.display(), "Delivery journal ready");
        Ok(journal)
    }

    /// In-memory journal.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| journal_err("Failed to create in-memory journal", &e))?;
        let journal = Self { conn };
        journal.init_schema()?;
        Ok(journal)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA_SQL)
            .map_err(|e| journal_err("Failed to initialize schema", &e))
    }

    /// Append an entry. Returns its row id.
    #[instrument(skip(self, entry), fields(request = %entry.request, status = %entry.status))]
    pub fn record(&self, entry: &JournalEntry) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO deliveries (request_id, session_id, kind, recipient, artifact_path,
                    artifact_sha256, status, reason, attempts, requested_at, finished_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    entry.request.to_string(),
                    entry.session.to_string(),
                    entry.kind,
                    entry.recipient,
                    entry.artifact_path,
                    entry.artifact_sha256,
                    entry.status,
                    entry.reason,
                    entry.attempts,
                    entry.requested_at.to_rfc3339(),
                    entry.finished_at.to_rfc3339(),
                ],
            )
            .map_err(|e| journal_err("Failed to record delivery", &e))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent entries first.
    pub fn recent(&self, limit: usize) -> Result<Vec<JournalEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT request_id, session_id, kind, recipient, artifact_path, artifact_sha256,
                        status, reason, attempts, requested_at, finished_at
                 FROM deliveries ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| journal_err("Failed to prepare query", &e))?;

        let rows = stmt
            .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, u32>(8)?,
                    row.get::<_, String>(9)?,
                    row.get::<_, String>(10)?,
                ))
            })
            .map_err(|e| journal_err("Failed to query deliveries", &e))?;

        let mut entries = Vec::new();
        for row in rows {
            let (request, session, kind, recipient, artifact_path, artifact_sha256, status, reason, attempts, requested_at, finished_at) =
                row.map_err(|e| journal_err("Failed to read row", &e))?;
            entries.push(JournalEntry {
                request: parse_uuid(&request)?,
                session: parse_uuid(&session)?,
                kind,
                recipient,
                artifact_path,
                artifact_sha256,
                status,
                reason,
                attempts,
                requested_at: parse_time(&requested_at)?,
                finished_at: parse_time(&finished_at)?,
            });
        }
        Ok(entries)
    }

    pub fn count(&self) -> Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM deliveries", [], |row| row.get(0))
            .map_err(|e| journal_err("Failed to count deliveries", &e))
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| BoothError::Journal(format!("Bad id '{s}': {e}")))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BoothError::Journal(format!("Bad timestamp '{s}': {e}")))
}
