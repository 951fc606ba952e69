// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Properties of the checkpoint save/restore decisions.

use proptest::prelude::*;
use velocoach::services::checkpoint::{
    CHECKPOINT_INTERVAL_MS, MAX_CHECKPOINT_AGE_MS, MIN_SAMPLES_FOR_CHECKPOINT,
};
use velocoach::services::{
    should_restore_checkpoint, should_save_checkpoint, RestoreReason, SaveReason,
};

#[test]
fn test_long_ride_saves() {
    let decision = should_save_checkpoint(0, 1_000_000_000, 10, true);
    assert!(decision.save);
    assert_eq!(decision.reason.as_str(), "interval_elapsed");
}

#[test]
fn test_interval_boundary_is_inclusive() {
    assert!(should_save_checkpoint(5_000, 65_000, 10, true).save);
    assert!(!should_save_checkpoint(5_000, 64_999, 10, true).save);
}

#[test]
fn test_sample_threshold_boundary() {
    assert_eq!(
        should_save_checkpoint(0, 120_000, MIN_SAMPLES_FOR_CHECKPOINT - 1, true).reason,
        SaveReason::TooFewSamples
    );
    assert!(should_save_checkpoint(0, 120_000, MIN_SAMPLES_FOR_CHECKPOINT, true).save);
}

#[test]
fn test_exactly_24_hours_is_stale() {
    let decision = should_restore_checkpoint(true, true, 1_000, 1_000 + MAX_CHECKPOINT_AGE_MS);
    assert!(!decision.restore);
    assert_eq!(decision.reason.as_str(), "stale_checkpoint");
}

#[test]
fn test_future_checkpoint_restores() {
    let decision = should_restore_checkpoint(true, true, 10_000, 0);
    assert!(decision.restore);
    assert_eq!(decision.reason, RestoreReason::ValidCheckpoint);
}

proptest! {
    #[test]
    fn prop_not_recording_never_saves(last in any::<i64>(), now in any::<i64>(), samples in any::<u64>()) {
        let decision = should_save_checkpoint(last, now, samples, false);
        prop_assert!(!decision.save);
        prop_assert_eq!(decision.reason, SaveReason::NotRecording);
    }

    #[test]
    fn prop_few_samples_never_save(last in any::<i64>(), now in any::<i64>(), samples in 0..MIN_SAMPLES_FOR_CHECKPOINT) {
        let decision = should_save_checkpoint(last, now, samples, true);
        prop_assert!(!decision.save);
        prop_assert_eq!(decision.reason, SaveReason::TooFewSamples);
    }

    #[test]
    fn prop_negative_elapsed_never_saves(
        now in -1_000_000_000_000i64..1_000_000_000_000i64,
        ahead in 1i64..1_000_000_000,
        samples in MIN_SAMPLES_FOR_CHECKPOINT..u64::MAX,
    ) {
        let decision = should_save_checkpoint(now + ahead, now, samples, true);
        prop_assert!(!decision.save);
        prop_assert_eq!(decision.reason, SaveReason::IntervalNotReached);
    }

    #[test]
    fn prop_elapsed_interval_saves(
        last in -1_000_000_000_000i64..1_000_000_000_000i64,
        extra in 0i64..1_000_000_000,
        samples in MIN_SAMPLES_FOR_CHECKPOINT..u64::MAX,
    ) {
        let decision = should_save_checkpoint(last, last + CHECKPOINT_INTERVAL_MS + extra, samples, true);
        prop_assert!(decision.save);
        prop_assert_eq!(decision.reason, SaveReason::IntervalElapsed);
    }

    #[test]
    fn prop_save_is_deterministic(last in any::<i64>(), now in any::<i64>(), samples in any::<u64>(), recording in any::<bool>()) {
        prop_assert_eq!(
            should_save_checkpoint(last, now, samples, recording),
            should_save_checkpoint(last, now, samples, recording)
        );
    }

    #[test]
    fn prop_missing_checkpoint_never_restores(recording in any::<bool>(), last in any::<i64>(), now in any::<i64>()) {
        let decision = should_restore_checkpoint(false, recording, last, now);
        prop_assert!(!decision.restore);
        prop_assert_eq!(decision.reason, RestoreReason::NoCheckpoint);
    }

    #[test]
    fn prop_not_recording_never_restores(last in any::<i64>(), now in any::<i64>()) {
        let decision = should_restore_checkpoint(true, false, last, now);
        prop_assert!(!decision.restore);
        prop_assert_eq!(decision.reason, RestoreReason::NotRecording);
    }

    #[test]
    fn prop_old_checkpoint_never_restores(
        last in -1_000_000_000_000i64..1_000_000_000_000i64,
        extra in 0i64..1_000_000_000_000,
    ) {
        let decision = should_restore_checkpoint(true, true, last, last + MAX_CHECKPOINT_AGE_MS + extra);
        prop_assert!(!decision.restore);
        prop_assert_eq!(decision.reason, RestoreReason::StaleCheckpoint);
    }

    #[test]
    fn prop_recent_checkpoint_restores(
        last in -1_000_000_000_000i64..1_000_000_000_000i64,
        age in 0i64..MAX_CHECKPOINT_AGE_MS,
    ) {
        let decision = should_restore_checkpoint(true, true, last, last + age);
        prop_assert!(decision.restore);
        prop_assert_eq!(decision.reason, RestoreReason::ValidCheckpoint);
    }
}
