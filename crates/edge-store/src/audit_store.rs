//! SQLite-backed durable audit sink.
//!
//! Every append is a single autocommit `INSERT` with `synchronous = FULL`, so
//! the row is on disk when [`AuditSink::append`] returns.  Each opened sink
//! tags its rows with a fresh run id; [`AuditSink::records`] returns the
//! current run, [`SqliteAuditSink::all_records`] every run in the file.
//!
//! # Storage layout
//!
//! `audit_records`:
//!
//! | column       | type    | description                                  |
//! |--------------|---------|----------------------------------------------|
//! | id           | INTEGER | Append order                                 |
//! | run_id       | TEXT    | UUID v4 of the sink that wrote the row       |
//! | recorded_at  | TEXT    | RFC-3339 wall-clock time of the write (UTC)  |
//! | sequence     | INTEGER | Supervisor sequence number                   |
//! | prior_state  | TEXT    | State before the record                      |
//! | new_state    | TEXT    | State after the record                       |
//! | authority    | TEXT    | Authority used                               |
//! | kind         | TEXT    | `transition` or `audit_only`                 |
//! | record       | TEXT    | Full [`AuditRecord`] as JSON                 |
//!
//! `error_records` keeps audit-required [`ErrorDescriptor`]s the same way
//! (class, code, severity and slot as columns, the descriptor as JSON).
//!
//! # Example
//!
//! ```rust
//! use edge_kernel::AuditSink;
//! use edge_store::SqliteAuditSink;
//!
//! let sink = SqliteAuditSink::open_in_memory().unwrap();
//! assert!(sink.records().unwrap().is_empty());
//! ```

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use edge_kernel::{AuditError, AuditSink};
use edge_types::{AuditKind, AuditRecord, ErrorDescriptor, SlotId};
use rusqlite::{Connection, params};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Errors raised by the SQLite audit store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("audit row encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<StoreError> for AuditError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Sqlite(inner) => AuditError::Write(inner.to_string()),
            StoreError::Encoding(inner) => AuditError::Write(format!("encoding: {inner}")),
        }
    }
}

/// Durable [`AuditSink`] over one SQLite connection.
pub struct SqliteAuditSink {
    conn: Mutex<Connection>,
    run_id: Uuid,
}

impl SqliteAuditSink {
    /// Open (or create) a persistent database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        let sink = Self::with_connection(conn)?;
        info!(path = %path.as_ref().display(), run_id = %sink.run_id, "audit store opened");
        Ok(sink)
    }

    /// Open a temporary in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS audit_records (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id      TEXT    NOT NULL,
                recorded_at TEXT    NOT NULL,
                sequence    INTEGER NOT NULL,
                prior_state TEXT    NOT NULL,
                new_state   TEXT    NOT NULL,
                authority   TEXT    NOT NULL,
                kind        TEXT    NOT NULL,
                record      TEXT    NOT NULL
            );
            CREATE TABLE IF NOT EXISTS error_records (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id      TEXT    NOT NULL,
                recorded_at TEXT    NOT NULL,
                class       TEXT    NOT NULL,
                code        INTEGER NOT NULL,
                severity    TEXT    NOT NULL,
                slot_id     INTEGER,
                descriptor  TEXT    NOT NULL
            );
            CREATE INDEX IF NOT EXISTS audit_records_run ON audit_records (run_id);
            CREATE INDEX IF NOT EXISTS error_records_run ON error_records (run_id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            run_id: Uuid::new_v4(),
        })
    }

    /// Identifier tagging every row written by this sink.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Audit records of every run stored in the database, in append order.
    pub fn all_records(&self) -> Result<Vec<AuditRecord>, StoreError> {
        self.query_json("SELECT record FROM audit_records ORDER BY id ASC", None)
    }

    /// Errors of the current run attributed to `slot_id`.
    pub fn errors_for_slot(&self, slot_id: SlotId) -> Result<Vec<ErrorDescriptor>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT descriptor FROM error_records
             WHERE run_id = ?1 AND slot_id = ?2
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![self.run_id.to_string(), slot_id], |row| {
            row.get::<_, String>(0)
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    fn insert_record(&self, record: &AuditRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        let kind = match record.kind {
            AuditKind::Transition => "transition",
            AuditKind::AuditOnly => "audit_only",
        };
        self.lock().execute(
            "INSERT INTO audit_records
                 (run_id, recorded_at, sequence, prior_state, new_state, authority, kind, record)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                self.run_id.to_string(),
                Utc::now().to_rfc3339(),
                record.sequence,
                record.prior.to_string(),
                record.new.to_string(),
                record.authority.to_string(),
                kind,
                json,
            ],
        )?;
        debug!(sequence = record.sequence, "audit record stored");
        Ok(())
    }

    fn insert_error(&self, error: &ErrorDescriptor) -> Result<(), StoreError> {
        let json = serde_json::to_string(error)?;
        self.lock().execute(
            "INSERT INTO error_records
                 (run_id, recorded_at, class, code, severity, slot_id, descriptor)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                self.run_id.to_string(),
                Utc::now().to_rfc3339(),
                error.class.to_string(),
                error.code,
                error.effective_severity().to_string(),
                error.slot,
                json,
            ],
        )?;
        debug!(%error, "error descriptor stored");
        Ok(())
    }

    /// Decode the single JSON column of `sql`, optionally bound to a run id.
    fn query_json<T: serde::de::DeserializeOwned>(
        &self,
        sql: &str,
        run_id: Option<&Uuid>,
    ) -> Result<Vec<T>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql)?;
        let mut rows = match run_id {
            Some(id) => stmt.query(params![id.to_string()])?,
            None => stmt.query([])?,
        };
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let json: String = row.get(0)?;
            out.push(serde_json::from_str(&json)?);
        }
        Ok(out)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves SQLite itself consistent.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AuditSink for SqliteAuditSink {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        Ok(self.insert_record(record)?)
    }

    fn record_error(&self, error: &ErrorDescriptor) -> Result<(), AuditError> {
        Ok(self.insert_error(error)?)
    }

    fn records(&self) -> Result<Vec<AuditRecord>, AuditError> {
        Ok(self.query_json(
            "SELECT record FROM audit_records WHERE run_id = ?1 ORDER BY id ASC",
            Some(&self.run_id),
        )?)
    }

    fn errors(&self) -> Result<Vec<ErrorDescriptor>, AuditError> {
        Ok(self.query_json(
            "SELECT descriptor FROM error_records WHERE run_id = ?1 ORDER BY id ASC",
            Some(&self.run_id),
        )?)
    }
}
