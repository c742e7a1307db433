//! Attendance persistence collaborator.
//!
//! The pipeline consumes this as a key-value contract: "is `identity`
//! marked present on day D" / "mark present now". The SQLite schema
//! enforces one row per identity per calendar day, so a check-then-act
//! race between concurrent decisions degrades to a duplicate instead
//! of a double write.

use chrono::{DateTime, Local, NaiveDate};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result of an attendance insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// A row for (identity, day) already existed — either found by the
    /// caller's check or inserted by a racing decision in between.
    AlreadyMarked,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRecord {
    pub identity: String,
    pub day: String,
    pub timestamp: String,
    pub status: String,
}

/// Contract consumed by the attendance decider.
pub trait AttendanceStore: Send + Sync {
    fn register_user(&self, identity: &str, name: &str) -> Result<(), StoreError>;
    fn lookup_name(&self, identity: &str) -> Result<Option<String>, StoreError>;
    fn has_attendance_on(&self, identity: &str, day: NaiveDate) -> Result<bool, StoreError>;
    fn record_attendance(
        &self,
        identity: &str,
        at: DateTime<Local>,
    ) -> Result<RecordOutcome, StoreError>;
    /// Most recent attendance rows, newest first.
    fn recent_attendance(&self, limit: usize) -> Result<Vec<AttendanceRecord>, StoreError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    user_id    TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS attendance (
    attendance_id INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id    TEXT NOT NULL,
    day           TEXT NOT NULL,
    timestamp     TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'present',
    UNIQUE (student_id, day)
);
";

/// SQLite-backed store. The connection is serialized behind a mutex;
/// every call is a single short statement.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!(path = %path.display(), "attendance database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl AttendanceStore for SqliteStore {
    fn register_user(&self, identity: &str, name: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users (user_id, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET name = excluded.name",
            params![identity, name, Local::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn lookup_name(&self, identity: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT name FROM users WHERE user_id = ?1")?;
        let mut rows = stmt.query(params![identity])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn has_attendance_on(&self, identity: &str, day: NaiveDate) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT 1 FROM attendance WHERE student_id = ?1 AND day = ?2")?;
        let mut rows = stmt.query(params![identity, day.to_string()])?;
        Ok(rows.next()?.is_some())
    }

    fn record_attendance(
        &self,
        identity: &str,
        at: DateTime<Local>,
    ) -> Result<RecordOutcome, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO attendance (student_id, day, timestamp, status)
             VALUES (?1, ?2, ?3, 'present')",
            params![identity, at.date_naive().to_string(), at.to_rfc3339()],
        )?;
        if changed == 0 {
            Ok(RecordOutcome::AlreadyMarked)
        } else {
            Ok(RecordOutcome::Recorded)
        }
    }

    fn recent_attendance(&self, limit: usize) -> Result<Vec<AttendanceRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT student_id, day, timestamp, status FROM attendance
             ORDER BY timestamp DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(AttendanceRecord {
                identity: row.get(0)?,
                day: row.get(1)?,
                timestamp: row.get(2)?,
                status: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}
