// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync bookkeeping shared by every locally recorded record kind.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Per-record sync status.
///
/// New records start `Pending`. `Synced` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "ui/src/generated/")
)]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(format!("unknown sync status {:?}", other)),
        }
    }
}

/// The three record kinds that flow through the sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Ride,
    Drill,
    Achievement,
}

impl RecordKind {
    /// All kinds, in the order a sync pass visits them.
    pub const ALL: [RecordKind; 3] = [RecordKind::Ride, RecordKind::Drill, RecordKind::Achievement];

    /// Backing table in the record database.
    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Ride => crate::db::tables::RIDES,
            RecordKind::Drill => crate::db::tables::DRILL_RESULTS,
            RecordKind::Achievement => crate::db::tables::ACHIEVEMENTS,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordKind::Ride => "ride",
            RecordKind::Drill => "drill",
            RecordKind::Achievement => "achievement",
        })
    }
}

/// Implemented by every record kind the sync pass uploads.
///
/// Business fields are immutable once created; only the sync columns kept
/// alongside them in the store ever change.
pub trait SyncRecord: Serialize + for<'de> Deserialize<'de> {
    const KIND: RecordKind;

    /// Stable, device-unique identifier. Re-inserting the same id is a no-op.
    fn local_id(&self) -> &str;

    /// Creation time (epoch ms); sync passes visit records in this order.
    fn created_at_ms(&self) -> i64;
}

/// A record as read back from the store, with its sync columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Stored<T> {
    pub record: T,
    pub sync_status: SyncStatus,
    /// Epoch ms of the last upload attempt, if any
    pub last_sync_attempt_ms: Option<i64>,
}

/// Per-status counts for one record kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "ui/src/generated/")
)]
pub struct StatusCounts {
    pub pending: u32,
    pub synced: u32,
    pub failed: u32,
}

impl StatusCounts {
    /// Records still waiting to reach the cloud.
    pub fn outstanding(&self) -> u32 {
        self.pending + self.failed
    }
}

/// Read-only projection of the record store for the UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "ui/src/generated/")
)]
pub struct RecordCounts {
    pub rides: StatusCounts,
    pub drills: StatusCounts,
    pub achievements: StatusCounts,
}

impl RecordCounts {
    pub fn for_kind_mut(&mut self, kind: RecordKind) -> &mut StatusCounts {
        match kind {
            RecordKind::Ride => &mut self.rides,
            RecordKind::Drill => &mut self.drills,
            RecordKind::Achievement => &mut self.achievements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_status_string_form() {
        for status in [SyncStatus::Pending, SyncStatus::Synced, SyncStatus::Failed] {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
        assert!("uploaded".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn test_sync_status_serializes_snake_case() {
        let json = serde_json::to_string(&SyncStatus::Failed).unwrap();
        assert_eq!(json, "\"failed\"");
    }

    #[test]
    fn test_outstanding_counts_pending_and_failed() {
        let counts = StatusCounts {
            pending: 2,
            synced: 9,
            failed: 1,
        };
        assert_eq!(counts.outstanding(), 3);
    }
}
