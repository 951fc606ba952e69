// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Upload pass over every record kind.
//!
//! A pass walks rides, then drill results, then achievements, each kind in
//! creation order. A failed upload marks that record `failed` and the pass
//! moves on; only authorization outcomes stop the pass early.

use crate::db::{CredentialStore, RecordStore};
use crate::error::{AppError, Result};
use crate::models::{Achievement, DrillResult, RecordKind, Ride, SyncRecord};
use crate::services::cloud::{endpoints, CloudClient};
use crate::services::token::TokenRefresher;
use crate::time_utils::now_ms;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::Mutex;

#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A record kind that knows where and how it is uploaded.
pub trait Uploadable: SyncRecord {
    fn endpoint(&self) -> &'static str;

    fn upload_body(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Uploadable for Ride {
    fn endpoint(&self) -> &'static str {
        if self.minute_snapshots.is_empty() {
            endpoints::SYNC_RIDE
        } else {
            endpoints::SYNC_RIDE_FULL
        }
    }
}

impl Uploadable for DrillResult {
    fn endpoint(&self) -> &'static str {
        endpoints::SYNC_DRILL
    }
}

impl Uploadable for Achievement {
    fn endpoint(&self) -> &'static str {
        endpoints::SYNC_ACHIEVEMENTS
    }

    /// The achievements endpoint takes a batch.
    fn upload_body(&self) -> Result<Value> {
        Ok(json!({ "achievements": [serde_json::to_value(self)?] }))
    }
}

/// How a sync pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "ui/src/generated/")
)]
pub enum SyncOutcome {
    /// Every eligible record was attempted.
    Completed,
    /// Another pass was running; this call did nothing.
    AlreadyRunning,
    /// No session; nothing was attempted.
    NotAuthenticated,
    /// The cloud revoked this device. Credentials were cleared.
    DeviceRevoked,
    /// A token refresh failed. The user has to log in again.
    NeedsLogin,
}

/// Per-kind tally for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "ui/src/generated/")
)]
pub struct KindSummary {
    pub synced: u32,
    pub failed: u32,
}

/// Result of `SyncCoordinator::sync_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "ui/src/generated/")
)]
pub struct SyncSummary {
    pub outcome: SyncOutcome,
    pub rides: KindSummary,
    pub drills: KindSummary,
    pub achievements: KindSummary,
}

impl SyncSummary {
    fn new(outcome: SyncOutcome) -> Self {
        Self {
            outcome,
            rides: KindSummary::default(),
            drills: KindSummary::default(),
            achievements: KindSummary::default(),
        }
    }

    pub fn total_synced(&self) -> u32 {
        self.rides.synced + self.drills.synced + self.achievements.synced
    }

    pub fn total_failed(&self) -> u32 {
        self.rides.failed + self.drills.failed + self.achievements.failed
    }

    /// The UI should send the user through device login.
    pub fn needs_login(&self) -> bool {
        matches!(
            self.outcome,
            SyncOutcome::NotAuthenticated | SyncOutcome::DeviceRevoked | SyncOutcome::NeedsLogin
        )
    }

    fn for_kind_mut(&mut self, kind: RecordKind) -> &mut KindSummary {
        match kind {
            RecordKind::Ride => &mut self.rides,
            RecordKind::Drill => &mut self.drills,
            RecordKind::Achievement => &mut self.achievements,
        }
    }
}

/// Why a single upload did not succeed.
enum UploadFailure {
    Revoked,
    LoggedOut,
    RefreshFailed(AppError),
    Rejected(AppError),
}

impl UploadFailure {
    /// Session-ending errors abort the pass; anything else fails the record.
    fn from_upload_error(err: AppError) -> Self {
        if !err.is_auth_terminal() {
            return UploadFailure::Rejected(err);
        }
        match err {
            AppError::DeviceRevoked => UploadFailure::Revoked,
            _ => UploadFailure::LoggedOut,
        }
    }
}

/// Mutable state carried across one pass.
struct PassState {
    access_token: String,
    device_id: String,
    now_ms: i64,
}

/// Drives sync passes. The only writer of record sync status.
pub struct SyncCoordinator {
    api: CloudClient,
    records: RecordStore,
    credentials: CredentialStore,
    refresher: TokenRefresher,
    failed_retry_cooldown: Duration,
    pass_lock: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(
        api: CloudClient,
        records: RecordStore,
        credentials: CredentialStore,
        refresher: TokenRefresher,
        failed_retry_cooldown: Duration,
    ) -> Self {
        Self {
            api,
            records,
            credentials,
            refresher,
            failed_retry_cooldown,
            pass_lock: Mutex::new(()),
        }
    }

    /// Run one sync pass now.
    pub async fn sync_all(&self) -> Result<SyncSummary> {
        self.sync_all_at(now_ms()).await
    }

    /// Run one sync pass, stamping attempts with `now_ms`.
    ///
    /// A call made while another pass is running returns immediately with
    /// `SyncOutcome::AlreadyRunning`. Local persistence errors abort the pass.
    pub async fn sync_all_at(&self, now_ms: i64) -> Result<SyncSummary> {
        let Ok(_guard) = self.pass_lock.try_lock() else {
            tracing::debug!("Sync pass already running, skipping");
            return Ok(SyncSummary::new(SyncOutcome::AlreadyRunning));
        };

        let Some(access_token) = self.credentials.access_token()? else {
            tracing::info!("Not logged in, skipping sync pass");
            return Ok(SyncSummary::new(SyncOutcome::NotAuthenticated));
        };

        let mut pass = PassState {
            access_token,
            device_id: self.credentials.device_id()?,
            now_ms,
        };
        let mut summary = SyncSummary::new(SyncOutcome::Completed);

        tracing::info!("Sync pass started");

        let mut stop = self.sync_kind::<Ride>(&mut pass, &mut summary).await?;
        if stop.is_none() {
            stop = self.sync_kind::<DrillResult>(&mut pass, &mut summary).await?;
        }
        if stop.is_none() {
            stop = self.sync_kind::<Achievement>(&mut pass, &mut summary).await?;
        }
        if let Some(outcome) = stop {
            summary.outcome = outcome;
        }

        tracing::info!(
            outcome = ?summary.outcome,
            synced = summary.total_synced(),
            failed = summary.total_failed(),
            "Sync pass finished"
        );
        Ok(summary)
    }

    /// Upload every eligible record of one kind. Returns `Some(outcome)` when
    /// the pass must stop.
    async fn sync_kind<T: Uploadable>(
        &self,
        pass: &mut PassState,
        summary: &mut SyncSummary,
    ) -> Result<Option<SyncOutcome>> {
        let cooldown_ms = i64::try_from(self.failed_retry_cooldown.as_millis()).unwrap_or(i64::MAX);
        let eligible = self.records.needing_sync::<T>(pass.now_ms, cooldown_ms)?;
        if eligible.is_empty() {
            return Ok(None);
        }
        tracing::debug!(kind = %T::KIND, count = eligible.len(), "Uploading records");

        for stored in eligible {
            let record = stored.record;
            let local_id = record.local_id();

            match self.upload_with_refresh(pass, &record).await {
                Ok(()) => {
                    self.records.mark_synced(T::KIND, local_id, pass.now_ms)?;
                    summary.for_kind_mut(T::KIND).synced += 1;
                    tracing::info!(kind = %T::KIND, local_id, "Record synced");
                }
                Err(UploadFailure::Revoked) => {
                    tracing::warn!(kind = %T::KIND, local_id, "Device revoked, aborting sync pass");
                    self.credentials.clear()?;
                    return Ok(Some(SyncOutcome::DeviceRevoked));
                }
                Err(UploadFailure::LoggedOut) => {
                    tracing::info!("Session cleared during sync pass, aborting");
                    return Ok(Some(SyncOutcome::NotAuthenticated));
                }
                Err(UploadFailure::RefreshFailed(e)) => {
                    tracing::warn!(error = %e, kind = %T::KIND, local_id, "Token refresh failed, login required");
                    self.records.mark_failed(T::KIND, local_id, pass.now_ms)?;
                    summary.for_kind_mut(T::KIND).failed += 1;
                    return Ok(Some(SyncOutcome::NeedsLogin));
                }
                Err(UploadFailure::Rejected(e)) => {
                    tracing::warn!(
                        error = %e,
                        transient = e.is_transient(),
                        kind = %T::KIND,
                        local_id,
                        "Upload failed, will retry on a later pass"
                    );
                    self.records.mark_failed(T::KIND, local_id, pass.now_ms)?;
                    summary.for_kind_mut(T::KIND).failed += 1;
                }
            }
        }

        Ok(None)
    }

    /// Upload once; on token expiry refresh silently and retry exactly once.
    async fn upload_with_refresh<T: Uploadable>(
        &self,
        pass: &mut PassState,
        record: &T,
    ) -> std::result::Result<(), UploadFailure> {
        let body = record.upload_body().map_err(UploadFailure::Rejected)?;
        let endpoint = record.endpoint();

        match self
            .api
            .upload(endpoint, &pass.access_token, &pass.device_id, &body)
            .await
        {
            Ok(()) => return Ok(()),
            Err(e) if e.is_token_expired() => {
                tracing::debug!(local_id = record.local_id(), "Access token expired, refreshing");
            }
            Err(e) => return Err(UploadFailure::from_upload_error(e)),
        }

        pass.access_token = match self.refresher.refresh(&pass.access_token).await {
            Ok(token) => token,
            Err(e) if e.is_auth_terminal() => return Err(UploadFailure::from_upload_error(e)),
            Err(e) => return Err(UploadFailure::RefreshFailed(e)),
        };

        match self
            .api
            .upload(endpoint, &pass.access_token, &pass.device_id, &body)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => Err(UploadFailure::from_upload_error(e)),
        }
    }
}
