// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! VeloCoach: local-first core for a cycling coach device
//!
//! Rides, drill results and achievements are stored on the device first and
//! uploaded to the cloud when a session is available. The device logs in
//! with a device-code flow, and an interrupted ride is recovered from its
//! last checkpoint at startup.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod time_utils;

use config::Config;
use db::{CheckpointStore, CredentialStore, RecordStore};
use error::Result;
use services::{CheckpointManager, CloudClient, DeviceAuthFlow, SyncCoordinator, TokenRefresher};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Shared application context.
pub struct AppContext {
    pub config: Config,
    pub credentials: CredentialStore,
    pub records: RecordStore,
    pub checkpoints: Arc<CheckpointManager>,
    pub auth: DeviceAuthFlow,
    pub sync: Arc<SyncCoordinator>,
}

impl AppContext {
    /// Open the three on-disk stores under `config.data_dir`.
    pub fn open(config: Config) -> Result<Self> {
        let credentials = CredentialStore::open(&config.credentials_path())?;
        let records = RecordStore::open(&config.records_path())?;
        let checkpoints = CheckpointStore::open(&config.checkpoint_path())?;
        let api = CloudClient::new(&config.api_base_url, config.http_timeout)?;
        let auth = DeviceAuthFlow::new(api.clone(), credentials.clone(), &config.device_name);
        Ok(Self::with_stores(config, api, credentials, records, checkpoints, auth))
    }

    /// Assemble a context from already-open stores.
    pub fn with_stores(
        config: Config,
        api: CloudClient,
        credentials: CredentialStore,
        records: RecordStore,
        checkpoints: CheckpointStore,
        auth: DeviceAuthFlow,
    ) -> Self {
        let refresher = TokenRefresher::new(api.clone(), credentials.clone());
        let sync = SyncCoordinator::new(
            api,
            records.clone(),
            credentials.clone(),
            refresher,
            config.failed_retry_cooldown,
        );

        Self {
            checkpoints: Arc::new(CheckpointManager::new(checkpoints, records.clone())),
            sync: Arc::new(sync),
            config,
            credentials,
            records,
            auth,
        }
    }

    /// Start the periodic checkpoint task at the configured tick.
    pub fn spawn_checkpoint_task(&self) -> JoinHandle<()> {
        tracing::debug!(
            tick_ms = self.config.checkpoint_tick.as_millis() as u64,
            "Starting checkpoint task"
        );
        self.checkpoints.spawn_periodic(self.config.checkpoint_tick)
    }

    /// Forget the session. The device identity and local records stay.
    pub fn logout(&self) -> Result<()> {
        self.auth.cancel();
        self.credentials.clear()?;
        tracing::info!("Logged out");
        Ok(())
    }
}
