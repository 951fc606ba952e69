// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Crash-recovery snapshot of an in-progress ride.

use serde::{Deserialize, Serialize};

use crate::models::ride::{MinuteSnapshot, RideAccumulator};

/// Accumulator state needed to resume a ride exactly where it stopped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorSnapshot {
    /// Whole-ride running sums
    pub totals: RideAccumulator,
    /// Sums for the minute that has not closed yet
    pub current_minute: RideAccumulator,
    pub current_minute_index: u32,
}

/// The single checkpoint slot. Present only while a ride is in progress.
#[derive(Debug, Clone, PartialEq)]
pub struct RideCheckpoint {
    pub ride_start_time_ms: i64,
    pub checkpoint_time_ms: i64,
    pub sample_count: u64,
    pub accumulator: AccumulatorSnapshot,
    pub minute_snapshots: Vec<MinuteSnapshot>,
    pub was_recording: bool,
}
