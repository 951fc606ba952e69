// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Crash recovery for the ride in progress.
//!
//! The decision functions are pure: every input, including the clock, is an
//! argument. `CheckpointManager` owns the live ride state and applies them.

use crate::db::{CheckpointStore, RecordStore};
use crate::error::{AppError, Result};
use crate::models::{AccumulatorSnapshot, MetricSample, MinuteSnapshot, Ride, RideCheckpoint};
use crate::time_utils::now_ms;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Minimum time between two checkpoint writes.
pub const CHECKPOINT_INTERVAL_MS: i64 = 60_000;
/// Samples needed before a ride is worth checkpointing.
pub const MIN_SAMPLES_FOR_CHECKPOINT: u64 = 10;
/// Checkpoints this old (or older) are not restored.
pub const MAX_CHECKPOINT_AGE_MS: i64 = 24 * 60 * 60 * 1000;

const MINUTE_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveReason {
    NotRecording,
    TooFewSamples,
    IntervalNotReached,
    IntervalElapsed,
}

impl SaveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveReason::NotRecording => "not_recording",
            SaveReason::TooFewSamples => "too_few_samples",
            SaveReason::IntervalNotReached => "interval_not_reached",
            SaveReason::IntervalElapsed => "interval_elapsed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreReason {
    NoCheckpoint,
    NotRecording,
    StaleCheckpoint,
    ValidCheckpoint,
}

impl RestoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreReason::NoCheckpoint => "no_checkpoint",
            RestoreReason::NotRecording => "not_recording",
            RestoreReason::StaleCheckpoint => "stale_checkpoint",
            RestoreReason::ValidCheckpoint => "valid_checkpoint",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaveDecision {
    pub save: bool,
    pub reason: SaveReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RestoreDecision {
    pub restore: bool,
    pub reason: RestoreReason,
}

/// Should the live ride be checkpointed now? First matching rule wins.
///
/// Elapsed time is `now - last`; a negative value (checkpoint stamped in the
/// future) never satisfies the interval.
pub fn should_save_checkpoint(
    last_checkpoint_time_ms: i64,
    now_ms: i64,
    sample_count: u64,
    is_recording: bool,
) -> SaveDecision {
    let (save, reason) = if !is_recording {
        (false, SaveReason::NotRecording)
    } else if sample_count < MIN_SAMPLES_FOR_CHECKPOINT {
        (false, SaveReason::TooFewSamples)
    } else if now_ms.saturating_sub(last_checkpoint_time_ms) < CHECKPOINT_INTERVAL_MS {
        (false, SaveReason::IntervalNotReached)
    } else {
        (true, SaveReason::IntervalElapsed)
    };
    SaveDecision { save, reason }
}

/// Should a stored checkpoint be resumed at startup? First matching rule wins.
pub fn should_restore_checkpoint(
    checkpoint_exists: bool,
    was_recording: bool,
    last_checkpoint_time_ms: i64,
    now_ms: i64,
) -> RestoreDecision {
    let (restore, reason) = if !checkpoint_exists {
        (false, RestoreReason::NoCheckpoint)
    } else if !was_recording {
        (false, RestoreReason::NotRecording)
    } else if now_ms.saturating_sub(last_checkpoint_time_ms) >= MAX_CHECKPOINT_AGE_MS {
        (false, RestoreReason::StaleCheckpoint)
    } else {
        (true, RestoreReason::ValidCheckpoint)
    };
    RestoreDecision { restore, reason }
}

/// What `restore_on_startup` found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    NoCheckpoint,
    /// The interrupted ride is live again.
    Restored {
        ride_start_time_ms: i64,
        sample_count: u64,
    },
    /// A checkpoint existed but was refused and deleted.
    Discarded(RestoreReason),
    /// The stored checkpoint could not be decoded and was deleted.
    Corrupt,
}

struct ActiveRide {
    started_at_ms: i64,
    recording: bool,
    accumulator: AccumulatorSnapshot,
    minute_snapshots: Vec<MinuteSnapshot>,
    last_checkpoint_ms: i64,
    recovered: bool,
}

impl ActiveRide {
    fn new(started_at_ms: i64) -> Self {
        Self {
            started_at_ms,
            recording: true,
            accumulator: AccumulatorSnapshot::default(),
            minute_snapshots: Vec::new(),
            last_checkpoint_ms: started_at_ms,
            recovered: false,
        }
    }

    fn from_checkpoint(checkpoint: RideCheckpoint) -> Self {
        Self {
            started_at_ms: checkpoint.ride_start_time_ms,
            recording: true,
            accumulator: checkpoint.accumulator,
            minute_snapshots: checkpoint.minute_snapshots,
            last_checkpoint_ms: checkpoint.checkpoint_time_ms,
            recovered: true,
        }
    }

    fn sample_count(&self) -> u64 {
        self.accumulator.totals.sample_count
    }

    fn add(&mut self, sample: &MetricSample) {
        let offset = sample.timestamp_ms.saturating_sub(self.started_at_ms).max(0);
        let minute_index = u32::try_from(offset / MINUTE_MS).unwrap_or(u32::MAX);

        // Samples that arrive late for an already-closed minute count toward the current one
        if minute_index > self.accumulator.current_minute_index {
            self.close_minute();
            self.accumulator.current_minute_index = minute_index;
        }

        self.accumulator.totals.add(sample);
        self.accumulator.current_minute.add(sample);
    }

    fn close_minute(&mut self) {
        let current = std::mem::take(&mut self.accumulator.current_minute);
        if current.sample_count > 0 {
            self.minute_snapshots.push(MinuteSnapshot::from_accumulator(
                self.accumulator.current_minute_index,
                &current,
            ));
        }
    }

    fn checkpoint(&self, now_ms: i64) -> RideCheckpoint {
        RideCheckpoint {
            ride_start_time_ms: self.started_at_ms,
            checkpoint_time_ms: now_ms,
            sample_count: self.sample_count(),
            accumulator: self.accumulator.clone(),
            minute_snapshots: self.minute_snapshots.clone(),
            was_recording: self.recording,
        }
    }

    fn finalize(&self, ended_at_ms: i64) -> Ride {
        let mut snapshots = self.minute_snapshots.clone();
        let current = &self.accumulator.current_minute;
        if current.sample_count > 0 {
            snapshots.push(MinuteSnapshot::from_accumulator(
                self.accumulator.current_minute_index,
                current,
            ));
        }
        Ride::from_totals(
            self.started_at_ms,
            ended_at_ms.max(self.started_at_ms),
            &self.accumulator.totals,
            snapshots,
            self.recovered,
        )
    }
}

#[derive(Default)]
struct RideState {
    startup_checked: bool,
    active: Option<ActiveRide>,
}

/// Owns the ride in progress and its checkpoint slot.
pub struct CheckpointManager {
    store: CheckpointStore,
    records: RecordStore,
    ride: Mutex<RideState>,
}

impl CheckpointManager {
    pub fn new(store: CheckpointStore, records: RecordStore) -> Self {
        Self {
            store,
            records,
            ride: Mutex::new(RideState::default()),
        }
    }

    /// Run once at process start, before any ride can begin.
    ///
    /// A refused or undecodable checkpoint is deleted so the next ride
    /// starts clean. If the slot cannot be read at all, rides stay locked
    /// until a later call reaches a decision.
    pub fn restore_on_startup(&self, now_ms: i64) -> Result<RestoreOutcome> {
        let mut state = self.state()?;
        if state.active.is_some() {
            return Err(AppError::InvalidState(
                "Recovery check must run before a ride starts".to_string(),
            ));
        }

        let outcome = self.evaluate_checkpoint(&mut state, now_ms)?;
        state.startup_checked = true;
        Ok(outcome)
    }

    fn evaluate_checkpoint(&self, state: &mut RideState, now_ms: i64) -> Result<RestoreOutcome> {
        let checkpoint = match self.store.load() {
            Ok(checkpoint) => checkpoint,
            Err(AppError::Serialization(e)) => {
                tracing::error!(error = %e, "Checkpoint is corrupt, discarding");
                self.store.clear()?;
                return Ok(RestoreOutcome::Corrupt);
            }
            Err(e) => return Err(e),
        };

        let decision = match &checkpoint {
            Some(cp) => should_restore_checkpoint(
                true,
                cp.was_recording,
                cp.checkpoint_time_ms,
                now_ms,
            ),
            None => should_restore_checkpoint(false, false, 0, now_ms),
        };

        let Some(checkpoint) = checkpoint else {
            tracing::debug!("No ride checkpoint to restore");
            return Ok(RestoreOutcome::NoCheckpoint);
        };

        if !decision.restore {
            tracing::info!(
                reason = decision.reason.as_str(),
                checkpoint_time_ms = checkpoint.checkpoint_time_ms,
                "Discarding ride checkpoint"
            );
            self.store.clear()?;
            return Ok(RestoreOutcome::Discarded(decision.reason));
        }

        let outcome = RestoreOutcome::Restored {
            ride_start_time_ms: checkpoint.ride_start_time_ms,
            sample_count: checkpoint.sample_count,
        };
        tracing::info!(
            ride_start_time_ms = checkpoint.ride_start_time_ms,
            sample_count = checkpoint.sample_count,
            "Restored interrupted ride"
        );
        state.active = Some(ActiveRide::from_checkpoint(checkpoint));
        Ok(outcome)
    }

    pub fn start_ride(&self, now_ms: i64) -> Result<()> {
        let mut state = self.state()?;
        if !state.startup_checked {
            return Err(AppError::InvalidState(
                "Checkpoint recovery has not run yet".to_string(),
            ));
        }
        if state.active.is_some() {
            return Err(AppError::InvalidState("A ride is already in progress".to_string()));
        }

        state.active = Some(ActiveRide::new(now_ms));
        tracing::info!(started_at_ms = now_ms, "Ride started");
        Ok(())
    }

    /// Feed one sensor sample. Returns `false` if the ride is paused.
    pub fn record_sample(&self, sample: &MetricSample) -> Result<bool> {
        let mut state = self.state()?;
        let ride = active_mut(&mut state)?;
        if !ride.recording {
            return Ok(false);
        }
        ride.add(sample);
        Ok(true)
    }

    pub fn pause(&self) -> Result<()> {
        let mut state = self.state()?;
        active_mut(&mut state)?.recording = false;
        tracing::info!("Ride paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        let mut state = self.state()?;
        active_mut(&mut state)?.recording = true;
        tracing::info!("Ride resumed");
        Ok(())
    }

    pub fn is_ride_active(&self) -> bool {
        self.state().map(|s| s.active.is_some()).unwrap_or(false)
    }

    pub fn is_recording(&self) -> bool {
        self.state()
            .map(|s| s.active.as_ref().is_some_and(|r| r.recording))
            .unwrap_or(false)
    }

    /// Periodic evaluation: checkpoint the live ride if the decision says so.
    pub fn tick(&self, now_ms: i64) -> Result<SaveDecision> {
        let mut state = self.state()?;
        let Some(ride) = state.active.as_mut() else {
            return Ok(should_save_checkpoint(0, now_ms, 0, false));
        };

        let decision = should_save_checkpoint(
            ride.last_checkpoint_ms,
            now_ms,
            ride.sample_count(),
            ride.recording,
        );
        if decision.save {
            self.store.save(&ride.checkpoint(now_ms))?;
            ride.last_checkpoint_ms = now_ms;
            tracing::debug!(sample_count = ride.sample_count(), "Ride checkpoint saved");
        }
        Ok(decision)
    }

    /// End the ride normally: store it as a pending record, then clear the
    /// checkpoint. If storing fails the ride stays active.
    pub fn finish_ride(&self, now_ms: i64) -> Result<Ride> {
        let mut state = self.state()?;
        let ride = active_mut(&mut state)?.finalize(now_ms);

        if !self.records.insert(&ride)? {
            tracing::info!(local_id = %ride.local_id, "Ride already stored");
        }
        state.active = None;
        self.store.clear()?;

        tracing::info!(
            local_id = %ride.local_id,
            duration_ms = ride.duration_ms(),
            sample_count = ride.sample_count,
            recovered = ride.recovered,
            "Ride finished"
        );
        Ok(ride)
    }

    /// Drop the ride in progress without storing it.
    pub fn discard_ride(&self) -> Result<()> {
        let mut state = self.state()?;
        if state.active.take().is_none() {
            return Err(AppError::InvalidState("No ride in progress".to_string()));
        }
        self.store.clear()?;
        tracing::info!("Ride discarded");
        Ok(())
    }

    /// Spawn the periodic checkpoint task.
    pub fn spawn_periodic(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = manager.tick(now_ms()) {
                    tracing::error!(error = %e, "Checkpoint tick failed");
                }
            }
        })
    }

    fn state(&self) -> Result<MutexGuard<'_, RideState>> {
        self.ride
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Ride state lock poisoned")))
    }
}

fn active_mut(state: &mut RideState) -> Result<&mut ActiveRide> {
    state
        .active
        .as_mut()
        .ok_or_else(|| AppError::InvalidState("No ride in progress".to_string()))
}
