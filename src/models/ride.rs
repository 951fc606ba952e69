// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ride model: live metric accumulation and the finalized ride record.

use serde::{Deserialize, Serialize};

use crate::models::sync::{RecordKind, SyncRecord};

/// One periodic sample delivered by the sensor pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Sample time (epoch ms)
    pub timestamp_ms: i64,
    /// Pedaling cadence in revolutions per minute
    pub cadence_rpm: f64,
    /// Instantaneous power in watts
    pub power_watts: f64,
    /// Share of power from the left leg (0-100)
    pub left_balance_pct: f64,
    /// Pedal smoothness (0-100)
    pub smoothness_pct: f64,
}

/// Running sums over a stream of samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RideAccumulator {
    pub sample_count: u64,
    pub cadence_sum: f64,
    pub power_sum: f64,
    pub max_power_watts: f64,
    pub left_balance_sum: f64,
    pub smoothness_sum: f64,
}

impl RideAccumulator {
    pub fn add(&mut self, sample: &MetricSample) {
        self.sample_count += 1;
        self.cadence_sum += sample.cadence_rpm;
        self.power_sum += sample.power_watts;
        self.max_power_watts = self.max_power_watts.max(sample.power_watts);
        self.left_balance_sum += sample.left_balance_pct;
        self.smoothness_sum += sample.smoothness_pct;
    }

    fn mean(&self, sum: f64) -> f64 {
        if self.sample_count == 0 {
            0.0
        } else {
            sum / self.sample_count as f64
        }
    }

    pub fn avg_cadence_rpm(&self) -> f64 {
        self.mean(self.cadence_sum)
    }

    pub fn avg_power_watts(&self) -> f64 {
        self.mean(self.power_sum)
    }

    pub fn avg_left_balance_pct(&self) -> f64 {
        self.mean(self.left_balance_sum)
    }

    pub fn avg_smoothness_pct(&self) -> f64 {
        self.mean(self.smoothness_sum)
    }
}

/// Averages for one elapsed minute of a ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinuteSnapshot {
    /// Zero-based minute since ride start
    pub minute_index: u32,
    pub sample_count: u64,
    pub avg_cadence_rpm: f64,
    pub avg_power_watts: f64,
    pub avg_left_balance_pct: f64,
    pub avg_smoothness_pct: f64,
}

impl MinuteSnapshot {
    pub fn from_accumulator(minute_index: u32, acc: &RideAccumulator) -> Self {
        Self {
            minute_index,
            sample_count: acc.sample_count,
            avg_cadence_rpm: acc.avg_cadence_rpm(),
            avg_power_watts: acc.avg_power_watts(),
            avg_left_balance_pct: acc.avg_left_balance_pct(),
            avg_smoothness_pct: acc.avg_smoothness_pct(),
        }
    }
}

/// Finalized ride, stored locally and uploaded by the sync pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    /// Device-unique id derived from the start time
    pub local_id: String,
    /// Ride start (epoch ms)
    pub started_at_ms: i64,
    /// Ride end (epoch ms)
    pub ended_at_ms: i64,
    pub sample_count: u64,
    pub avg_cadence_rpm: f64,
    pub avg_power_watts: f64,
    pub max_power_watts: f64,
    pub avg_left_balance_pct: f64,
    pub avg_smoothness_pct: f64,
    /// Per-minute breakdown; empty for rides shorter than a minute
    #[serde(default)]
    pub minute_snapshots: Vec<MinuteSnapshot>,
    /// Whether the ride resumed from a crash checkpoint
    #[serde(default)]
    pub recovered: bool,
}

impl Ride {
    pub fn local_id_for(started_at_ms: i64) -> String {
        format!("ride-{}", started_at_ms)
    }

    pub fn from_totals(
        started_at_ms: i64,
        ended_at_ms: i64,
        totals: &RideAccumulator,
        minute_snapshots: Vec<MinuteSnapshot>,
        recovered: bool,
    ) -> Self {
        Self {
            local_id: Self::local_id_for(started_at_ms),
            started_at_ms,
            ended_at_ms,
            sample_count: totals.sample_count,
            avg_cadence_rpm: totals.avg_cadence_rpm(),
            avg_power_watts: totals.avg_power_watts(),
            max_power_watts: totals.max_power_watts,
            avg_left_balance_pct: totals.avg_left_balance_pct(),
            avg_smoothness_pct: totals.avg_smoothness_pct(),
            minute_snapshots,
            recovered,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.ended_at_ms - self.started_at_ms).max(0)
    }
}

impl SyncRecord for Ride {
    const KIND: RecordKind = RecordKind::Ride;

    fn local_id(&self) -> &str {
        &self.local_id
    }

    fn created_at_ms(&self) -> i64 {
        self.ended_at_ms
    }
}
