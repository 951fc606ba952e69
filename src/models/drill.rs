// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Drill result and achievement records.

use serde::{Deserialize, Serialize};

use crate::models::sync::{RecordKind, SyncRecord};

/// Outcome of one completed technique drill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrillResult {
    pub local_id: String,
    /// Drill identifier (e.g. "high_cadence_spin", "single_leg")
    pub drill_type: String,
    pub started_at_ms: i64,
    pub completed_at_ms: i64,
    /// Score computed by the drill scorer when the drill completed
    pub score: f64,
    pub avg_cadence_rpm: f64,
    pub avg_smoothness_pct: f64,
}

impl DrillResult {
    pub fn new(
        drill_type: &str,
        started_at_ms: i64,
        completed_at_ms: i64,
        score: f64,
        avg_cadence_rpm: f64,
        avg_smoothness_pct: f64,
    ) -> Self {
        Self {
            local_id: format!("drill-{}-{}", drill_type, completed_at_ms),
            drill_type: drill_type.to_string(),
            started_at_ms,
            completed_at_ms,
            score,
            avg_cadence_rpm,
            avg_smoothness_pct,
        }
    }
}

impl SyncRecord for DrillResult {
    const KIND: RecordKind = RecordKind::Drill;

    fn local_id(&self) -> &str {
        &self.local_id
    }

    fn created_at_ms(&self) -> i64 {
        self.completed_at_ms
    }
}

/// An unlocked achievement. Each key unlocks at most once per device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    pub local_id: String,
    /// Rule identifier (e.g. "first_ride", "cadence_100")
    pub achievement_key: String,
    pub title: String,
    pub unlocked_at_ms: i64,
    /// Ride that triggered the unlock, if any
    pub ride_local_id: Option<String>,
}

impl Achievement {
    pub fn new(
        achievement_key: &str,
        title: &str,
        unlocked_at_ms: i64,
        ride_local_id: Option<String>,
    ) -> Self {
        Self {
            local_id: format!("achievement-{}", achievement_key),
            achievement_key: achievement_key.to_string(),
            title: title.to_string(),
            unlocked_at_ms,
            ride_local_id,
        }
    }
}

impl SyncRecord for Achievement {
    const KIND: RecordKind = RecordKind::Achievement;

    fn local_id(&self) -> &str {
        &self.local_id
    }

    fn created_at_ms(&self) -> i64 {
        self.unlocked_at_ms
    }
}
