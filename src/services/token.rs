// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Silent access-token refresh.

use crate::db::CredentialStore;
use crate::error::{AppError, Result};
use crate::services::cloud::CloudClient;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Exchanges the stored refresh token for a new access token.
///
/// Refreshes are serialized. A caller that was waiting on the lock reuses
/// the token another caller just stored instead of refreshing again.
#[derive(Clone)]
pub struct TokenRefresher {
    api: CloudClient,
    credentials: CredentialStore,
    lock: Arc<Mutex<()>>,
}

impl TokenRefresher {
    pub fn new(api: CloudClient, credentials: CredentialStore) -> Self {
        Self {
            api,
            credentials,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Return an access token newer than `stale_token`.
    ///
    /// Errors:
    /// - `NotAuthenticated` if there is no session to refresh
    /// - `DeviceRevoked` if the cloud revoked this device
    /// - anything else means the refresh failed and the user must log in again
    pub async fn refresh(&self, stale_token: &str) -> Result<String> {
        let _guard = self.lock.lock().await;

        // Another task may have refreshed while we were waiting
        let Some(credentials) = self.credentials.load()? else {
            return Err(AppError::NotAuthenticated);
        };
        if credentials.access_token != stale_token {
            tracing::debug!("Access token already refreshed by another task");
            return Ok(credentials.access_token);
        }

        tracing::info!(user_id = %credentials.user_id, "Refreshing access token");
        let access_token = self
            .api
            .refresh_access_token(&credentials.refresh_token)
            .await?;

        self.credentials.update_access_token(&access_token)?;
        tracing::info!("Access token refreshed");
        Ok(access_token)
    }
}
