// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local persistence (SQLite).
//!
//! Credentials, records and the ride checkpoint each live in their own
//! database file so that damage to one cannot take the others with it.

pub mod checkpoint;
pub mod credentials;
pub mod records;

pub use checkpoint::CheckpointStore;
pub use credentials::CredentialStore;
pub use records::RecordStore;

use crate::error::{AppError, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Table names as constants.
pub mod tables {
    pub const CREDENTIALS: &str = "credentials";
    pub const RIDES: &str = "rides";
    pub const DRILL_RESULTS: &str = "drill_results";
    pub const ACHIEVEMENTS: &str = "achievements";
    /// Single-row table (id is always 1)
    pub const RIDE_CHECKPOINT: &str = "ride_checkpoint";
}

/// Open a database file, creating its parent directory if needed.
pub(crate) fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Database(format!(
                    "Failed to create data directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let conn = Connection::open(path).map_err(|e| {
        AppError::Database(format!("Failed to open database {}: {}", path.display(), e))
    })?;
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "FULL")?;

    tracing::debug!(path = %path.display(), "Opened database");
    Ok(conn)
}

/// Current schema version of a connection.
pub(crate) fn schema_version(conn: &Connection) -> Result<i64> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Lock a shared connection.
pub(crate) fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| AppError::Database("Database connection lock poisoned".to_string()))
}
