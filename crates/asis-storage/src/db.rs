//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access.
//! Every handle runs in WAL mode with foreign keys on, so deleting a
//! conversation cascades to its messages.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use asis_core::error::AsisError;

use crate::migrations;

/// The single SQLite handle shared by every repository.
///
/// The connection is wrapped in a Mutex since rusqlite Connection is not Sync.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open `path`, creating parent directories and the schema when missing.
    ///
    /// Configures WAL mode, synchronous=NORMAL, foreign keys, and runs
    /// all pending migrations.
    pub fn new(path: &Path) -> Result<Self, AsisError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AsisError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(|e| AsisError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Fresh in-memory database with the full schema.
    pub fn in_memory() -> Result<Self, AsisError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AsisError::Storage(format!("Failed to open in-memory db: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| AsisError::Storage(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Run `f` while holding the connection lock.
    ///
    /// The mutex is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, AsisError>
    where
        F: FnOnce(&Connection) -> Result<T, AsisError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AsisError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

// =============================================================================
// Row helpers shared by the repositories
// =============================================================================

pub(crate) fn storage_err(e: rusqlite::Error) -> AsisError {
    AsisError::Storage(e.to_string())
}

pub(crate) fn col<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> Result<T, AsisError> {
    row.get(idx).map_err(storage_err)
}

pub(crate) fn uuid_col(row: &rusqlite::Row<'_>, idx: usize) -> Result<Uuid, AsisError> {
    let raw: String = col(row, idx)?;
    Uuid::parse_str(&raw).map_err(|e| AsisError::Storage(format!("Invalid UUID: {}", e)))
}

pub(crate) fn time_col(row: &rusqlite::Row<'_>, idx: usize) -> Result<DateTime<Utc>, AsisError> {
    let secs: i64 = col(row, idx)?;
    Ok(DateTime::from_timestamp(secs, 0).unwrap_or_default())
}

pub(crate) fn opt_time_col(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> Result<Option<DateTime<Utc>>, AsisError> {
    let secs: Option<i64> = col(row, idx)?;
    Ok(secs.and_then(|s| DateTime::from_timestamp(s, 0)))
}

/// `LIMIT` parameter; values past `i64::MAX` saturate instead of wrapping
/// to a negative (unbounded) limit.
pub(crate) fn sql_limit(limit: u64) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Case-insensitive (Unicode) substring match used by text lookups.
pub(crate) fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
