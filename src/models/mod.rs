// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod checkpoint;
pub mod drill;
pub mod ride;
pub mod sync;
pub mod user;

pub use checkpoint::{AccumulatorSnapshot, RideCheckpoint};
pub use drill::{Achievement, DrillResult};
pub use ride::{MetricSample, MinuteSnapshot, Ride, RideAccumulator};
pub use sync::{RecordCounts, RecordKind, StatusCounts, Stored, SyncRecord, SyncStatus};
pub use user::Credentials;
