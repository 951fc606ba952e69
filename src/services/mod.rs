// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - login, sync and ride recovery.

pub mod checkpoint;
pub mod cloud;
pub mod device_auth;
pub mod sync;
pub mod token;

pub use checkpoint::{
    should_restore_checkpoint, should_save_checkpoint, CheckpointManager, RestoreDecision,
    RestoreOutcome, RestoreReason, SaveDecision, SaveReason,
};
pub use cloud::{CloudClient, PollOutcome};
pub use device_auth::{AuthEvent, DeviceAuthFlow, DeviceAuthState, SleepFn};
pub use sync::{KindSummary, SyncCoordinator, SyncOutcome, SyncSummary, Uploadable};
pub use token::TokenRefresher;
