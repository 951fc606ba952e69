// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Single-slot durable store for the in-progress ride checkpoint.
//!
//! The table is constrained to one row (`id = 1`); every save replaces it.

use crate::db::{lock, open_connection, schema_version, tables};
use crate::error::{AppError, Result};
use crate::models::RideCheckpoint;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Checkpoint store backed by its own SQLite file.
#[derive(Clone)]
pub struct CheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl CheckpointStore {
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_connection(open_connection(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        if schema_version(&conn)? < 1 {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    ride_start_time INTEGER NOT NULL,
                    checkpoint_time INTEGER NOT NULL,
                    sample_count INTEGER NOT NULL,
                    accumulator TEXT NOT NULL,
                    minute_snapshots TEXT NOT NULL,
                    was_recording INTEGER NOT NULL
                );
                PRAGMA user_version = 1;",
                tables::RIDE_CHECKPOINT
            ))?;
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Replace the checkpoint slot (last write wins).
    pub fn save(&self, checkpoint: &RideCheckpoint) -> Result<()> {
        let accumulator = serde_json::to_string(&checkpoint.accumulator)?;
        let minute_snapshots = serde_json::to_string(&checkpoint.minute_snapshots)?;

        let conn = lock(&self.conn)?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (id, ride_start_time, checkpoint_time, sample_count,
                    accumulator, minute_snapshots, was_recording)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)",
                tables::RIDE_CHECKPOINT
            ),
            params![
                checkpoint.ride_start_time_ms,
                checkpoint.checkpoint_time_ms,
                checkpoint.sample_count as i64,
                accumulator,
                minute_snapshots,
                checkpoint.was_recording,
            ],
        )?;
        Ok(())
    }

    /// Read the checkpoint slot.
    pub fn load(&self) -> Result<Option<RideCheckpoint>> {
        let conn = lock(&self.conn)?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT ride_start_time, checkpoint_time, sample_count, accumulator,
                        minute_snapshots, was_recording
                     FROM {} WHERE id = 1",
                    tables::RIDE_CHECKPOINT
                ),
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, bool>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(row_decode_error)?;

        let Some((start, at, samples, accumulator, minutes, was_recording)) = row else {
            return Ok(None);
        };

        Ok(Some(RideCheckpoint {
            ride_start_time_ms: start,
            checkpoint_time_ms: at,
            sample_count: samples.max(0) as u64,
            accumulator: serde_json::from_str(&accumulator)?,
            minute_snapshots: serde_json::from_str(&minutes)?,
            was_recording,
        }))
    }

    /// Empty the slot. Clearing an empty slot is fine.
    pub fn clear(&self) -> Result<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            &format!("DELETE FROM {}", tables::RIDE_CHECKPOINT),
            [],
        )?;
        Ok(())
    }

    pub fn exists(&self) -> Result<bool> {
        let conn = lock(&self.conn)?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", tables::RIDE_CHECKPOINT),
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

/// A row whose columns hold the wrong types is as undecodable as bad JSON.
fn row_decode_error(err: rusqlite::Error) -> AppError {
    match err {
        rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::IntegralValueOutOfRange(..) => AppError::Serialization(err.to_string()),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccumulatorSnapshot, MinuteSnapshot};

    fn checkpoint(at: i64, samples: u64) -> RideCheckpoint {
        RideCheckpoint {
            ride_start_time_ms: 1_000,
            checkpoint_time_ms: at,
            sample_count: samples,
            accumulator: AccumulatorSnapshot::default(),
            minute_snapshots: vec![MinuteSnapshot {
                minute_index: 0,
                sample_count: samples,
                avg_cadence_rpm: 88.0,
                avg_power_watts: 210.0,
                avg_left_balance_pct: 49.0,
                avg_smoothness_pct: 24.0,
            }],
            was_recording: true,
        }
    }

    #[test]
    fn test_single_slot_replace_on_write() {
        let store = CheckpointStore::open_in_memory().unwrap();
        assert!(store.load().unwrap().is_none());

        store.save(&checkpoint(61_000, 60)).unwrap();
        store.save(&checkpoint(121_000, 120)).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, checkpoint(121_000, 120));

        let conn = lock(&store.conn).unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM ride_checkpoint", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_clear() {
        let store = CheckpointStore::open_in_memory().unwrap();
        store.clear().unwrap();
        store.save(&checkpoint(61_000, 60)).unwrap();
        assert!(store.exists().unwrap());

        store.clear().unwrap();
        assert!(!store.exists().unwrap());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_mistyped_row_is_a_decode_error() {
        let store = CheckpointStore::open_in_memory().unwrap();
        lock(&store.conn)
            .unwrap()
            .execute(
                "INSERT INTO ride_checkpoint (id, ride_start_time, checkpoint_time, sample_count,
                    accumulator, minute_snapshots, was_recording)
                 VALUES (1, 1000, 'oops', 60, '{}', '[]', 1)",
                [],
            )
            .unwrap();

        assert!(matches!(store.load(), Err(AppError::Serialization(_))));
    }
}
