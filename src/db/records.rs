// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Durable store for rides, drill results and achievements.
//!
//! Each kind has its own table with the business fields kept as an immutable
//! JSON payload next to the sync columns:
//! - `sync_status` (`pending` / `synced` / `failed`)
//! - `last_sync_attempt` (epoch ms, NULL until the first upload attempt)
//!
//! Only the sync pass writes the sync columns. `synced` rows are never
//! transitioned again.

use crate::db::{lock, open_connection, schema_version};
use crate::error::{AppError, Result};
use crate::models::{RecordCounts, RecordKind, Stored, SyncRecord, SyncStatus};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Raw row before the payload is decoded.
struct RawRow {
    local_id: String,
    payload: String,
    sync_status: String,
    last_sync_attempt: Option<i64>,
}

/// Record store backed by its own SQLite file.
#[derive(Clone)]
pub struct RecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl RecordStore {
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_connection(open_connection(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        if schema_version(&conn)? < 1 {
            for kind in RecordKind::ALL {
                let table = kind.table();
                conn.execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        local_id TEXT PRIMARY KEY,
                        created_at INTEGER NOT NULL,
                        payload TEXT NOT NULL,
                        sync_status TEXT NOT NULL DEFAULT 'pending',
                        last_sync_attempt INTEGER
                    );
                    CREATE INDEX IF NOT EXISTS idx_{table}_sync
                        ON {table} (sync_status, created_at);"
                ))?;
            }
            conn.execute_batch("PRAGMA user_version = 1;")?;
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ─── Record Operations ───────────────────────────────────────

    /// Insert a new record as `pending`.
    ///
    /// Returns `false` if a record with the same local id already exists, in
    /// which case the stored row is left untouched.
    pub fn insert<T: SyncRecord>(&self, record: &T) -> Result<bool> {
        let payload = serde_json::to_string(record)?;
        let conn = lock(&self.conn)?;
        let inserted = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (local_id, created_at, payload, sync_status)
                 VALUES (?1, ?2, ?3, ?4)",
                T::KIND.table()
            ),
            params![
                record.local_id(),
                record.created_at_ms(),
                payload,
                SyncStatus::Pending.as_str()
            ],
        )?;

        if inserted == 1 {
            tracing::debug!(kind = %T::KIND, local_id = record.local_id(), "Stored record");
        } else {
            tracing::debug!(
                kind = %T::KIND,
                local_id = record.local_id(),
                "Record already stored (idempotent skip)"
            );
        }
        Ok(inserted == 1)
    }

    /// Get one record by local id.
    pub fn get<T: SyncRecord>(&self, local_id: &str) -> Result<Option<Stored<T>>> {
        let conn = lock(&self.conn)?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT local_id, payload, sync_status, last_sync_attempt
                     FROM {} WHERE local_id = ?1",
                    T::KIND.table()
                ),
                params![local_id],
                raw_from_row,
            )
            .optional()?;

        raw.map(decode::<T>).transpose()
    }

    /// All records of a kind, newest first (history view).
    pub fn list<T: SyncRecord>(&self) -> Result<Vec<Stored<T>>> {
        let rows = self.query_raw(
            &format!(
                "SELECT local_id, payload, sync_status, last_sync_attempt
                 FROM {} ORDER BY created_at DESC, rowid DESC",
                T::KIND.table()
            ),
            params![],
        )?;
        Ok(decode_all::<T>(rows))
    }

    /// Records the next sync pass should upload, oldest first.
    ///
    /// Includes every `pending` record plus `failed` records whose last
    /// attempt is at least `failed_cooldown_ms` old. A zero cooldown retries
    /// every failed record on every pass.
    pub fn needing_sync<T: SyncRecord>(
        &self,
        now_ms: i64,
        failed_cooldown_ms: i64,
    ) -> Result<Vec<Stored<T>>> {
        let retry_before = now_ms.saturating_sub(failed_cooldown_ms);
        let rows = self.query_raw(
            &format!(
                "SELECT local_id, payload, sync_status, last_sync_attempt
                 FROM {}
                 WHERE sync_status = 'pending'
                    OR (sync_status = 'failed'
                        AND (last_sync_attempt IS NULL OR last_sync_attempt <= ?1))
                 ORDER BY created_at ASC, rowid ASC",
                T::KIND.table()
            ),
            params![retry_before],
        )?;
        Ok(decode_all::<T>(rows))
    }

    // ─── Status Transitions ──────────────────────────────────────

    /// Record a successful upload.
    pub fn mark_synced(&self, kind: RecordKind, local_id: &str, attempt_ms: i64) -> Result<bool> {
        self.transition(kind, local_id, SyncStatus::Synced, attempt_ms)
    }

    /// Record a failed upload. The record stays eligible for later passes.
    pub fn mark_failed(&self, kind: RecordKind, local_id: &str, attempt_ms: i64) -> Result<bool> {
        self.transition(kind, local_id, SyncStatus::Failed, attempt_ms)
    }

    fn transition(
        &self,
        kind: RecordKind,
        local_id: &str,
        status: SyncStatus,
        attempt_ms: i64,
    ) -> Result<bool> {
        let conn = lock(&self.conn)?;
        let updated = conn.execute(
            &format!(
                "UPDATE {} SET sync_status = ?2, last_sync_attempt = ?3
                 WHERE local_id = ?1 AND sync_status != 'synced'",
                kind.table()
            ),
            params![local_id, status.as_str(), attempt_ms],
        )?;

        if updated == 0 {
            tracing::warn!(
                kind = %kind,
                local_id,
                status = %status,
                "Status transition skipped (record missing or already synced)"
            );
        }
        Ok(updated == 1)
    }

    /// Manual retry: move `failed` records back to `pending`.
    ///
    /// With `kind = None` every kind is reset. Returns the number of records moved.
    pub fn retry_failed(&self, kind: Option<RecordKind>) -> Result<usize> {
        let kinds: Vec<RecordKind> = match kind {
            Some(k) => vec![k],
            None => RecordKind::ALL.to_vec(),
        };

        let conn = lock(&self.conn)?;
        let mut moved = 0;
        for kind in kinds {
            moved += conn.execute(
                &format!(
                    "UPDATE {} SET sync_status = 'pending' WHERE sync_status = 'failed'",
                    kind.table()
                ),
                [],
            )?;
        }

        tracing::info!(moved, "Failed records reset to pending");
        Ok(moved)
    }

    /// Sync status of one record.
    pub fn status_of(&self, kind: RecordKind, local_id: &str) -> Result<Option<SyncStatus>> {
        let conn = lock(&self.conn)?;
        let status: Option<String> = conn
            .query_row(
                &format!("SELECT sync_status FROM {} WHERE local_id = ?1", kind.table()),
                params![local_id],
                |row| row.get(0),
            )
            .optional()?;

        status
            .map(|s| s.parse().map_err(AppError::Database))
            .transpose()
    }

    /// Per-kind, per-status counts for the UI.
    pub fn counts(&self) -> Result<RecordCounts> {
        let conn = lock(&self.conn)?;
        let mut counts = RecordCounts::default();

        for kind in RecordKind::ALL {
            let mut stmt = conn.prepare(&format!(
                "SELECT sync_status, COUNT(*) FROM {} GROUP BY sync_status",
                kind.table()
            ))?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
            })?;

            let slot = counts.for_kind_mut(kind);
            for row in rows {
                let (status, n) = row?;
                match status.parse::<SyncStatus>() {
                    Ok(SyncStatus::Pending) => slot.pending = n,
                    Ok(SyncStatus::Synced) => slot.synced = n,
                    Ok(SyncStatus::Failed) => slot.failed = n,
                    Err(e) => tracing::warn!(kind = %kind, error = %e, "Unknown status in store"),
                }
            }
        }

        Ok(counts)
    }

    // ─── Helpers ─────────────────────────────────────────────────

    fn query_raw(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<RawRow>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, raw_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn raw_from_row(row: &rusqlite::Row) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        local_id: row.get(0)?,
        payload: row.get(1)?,
        sync_status: row.get(2)?,
        last_sync_attempt: row.get(3)?,
    })
}

fn decode<T: SyncRecord>(raw: RawRow) -> Result<Stored<T>> {
    let record: T = serde_json::from_str(&raw.payload).map_err(|e| {
        AppError::Serialization(format!(
            "Corrupt {} payload for {}: {}",
            T::KIND,
            raw.local_id,
            e
        ))
    })?;
    let sync_status = raw.sync_status.parse().map_err(AppError::Database)?;

    Ok(Stored {
        record,
        sync_status,
        last_sync_attempt_ms: raw.last_sync_attempt,
    })
}

/// Decode rows, skipping (and logging) any that are corrupt so one bad row
/// cannot hide the others.
fn decode_all<T: SyncRecord>(rows: Vec<RawRow>) -> Vec<Stored<T>> {
    rows.into_iter()
        .filter_map(|raw| match decode::<T>(raw) {
            Ok(stored) => Some(stored),
            Err(e) => {
                tracing::error!(error = %e, "Skipping unreadable record");
                None
            }
        })
        .collect()
}
