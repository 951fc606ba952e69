// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Durable key/value slot for the device identity, session tokens and the
//! cached user profile.
//!
//! Every multi-key write happens inside one transaction, so readers never
//! observe a new access token paired with an old refresh token.

use crate::db::{lock, open_connection, schema_version, tables};
use crate::error::{AppError, Result};
use crate::models::Credentials;
use ring::rand::{SecureRandom, SystemRandom};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// The fixed set of keys this store holds.
pub mod keys {
    pub const DEVICE_ID: &str = "device_id";
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const USER_ID: &str = "user_id";
    pub const EMAIL: &str = "email";
    pub const DISPLAY_NAME: &str = "display_name";
    pub const PICTURE: &str = "picture";
}

/// Credential store backed by its own SQLite file.
#[derive(Clone)]
pub struct CredentialStore {
    conn: Arc<Mutex<Connection>>,
}

impl CredentialStore {
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_connection(open_connection(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        if schema_version(&conn)? < 1 {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );
                PRAGMA user_version = 1;",
                tables::CREDENTIALS
            ))?;
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Stable device identifier, generated on first use and never changed.
    pub fn device_id(&self) -> Result<String> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                &format!("SELECT value FROM {} WHERE key = ?1", tables::CREDENTIALS),
                params![keys::DEVICE_ID],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            return Ok(id);
        }

        let id = generate_device_id()?;
        tx.execute(
            &format!(
                "INSERT INTO {} (key, value) VALUES (?1, ?2)",
                tables::CREDENTIALS
            ),
            params![keys::DEVICE_ID, id],
        )?;
        tx.commit()?;

        tracing::info!("Generated new device identity");
        Ok(id)
    }

    /// Load the full credential set, or `None` when logged out.
    pub fn load(&self) -> Result<Option<Credentials>> {
        let conn = lock(&self.conn)?;
        let mut stmt =
            conn.prepare(&format!("SELECT key, value FROM {}", tables::CREDENTIALS))?;
        let mut values: HashMap<String, String> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;

        let (Some(access_token), Some(refresh_token)) = (
            values.remove(keys::ACCESS_TOKEN),
            values.remove(keys::REFRESH_TOKEN),
        ) else {
            return Ok(None);
        };

        Ok(Some(Credentials {
            access_token,
            refresh_token,
            user_id: values.remove(keys::USER_ID).unwrap_or_default(),
            email: values.remove(keys::EMAIL).unwrap_or_default(),
            display_name: values.remove(keys::DISPLAY_NAME).unwrap_or_default(),
            picture: values.remove(keys::PICTURE),
        }))
    }

    /// Overwrite the credential set wholesale.
    pub fn save(&self, credentials: &Credentials) -> Result<()> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        {
            let mut upsert = tx.prepare(&format!(
                "INSERT OR REPLACE INTO {} (key, value) VALUES (?1, ?2)",
                tables::CREDENTIALS
            ))?;
            upsert.execute(params![keys::ACCESS_TOKEN, credentials.access_token])?;
            upsert.execute(params![keys::REFRESH_TOKEN, credentials.refresh_token])?;
            upsert.execute(params![keys::USER_ID, credentials.user_id])?;
            upsert.execute(params![keys::EMAIL, credentials.email])?;
            upsert.execute(params![keys::DISPLAY_NAME, credentials.display_name])?;
            match &credentials.picture {
                Some(picture) => {
                    upsert.execute(params![keys::PICTURE, picture])?;
                }
                None => {
                    tx.execute(
                        &format!("DELETE FROM {} WHERE key = ?1", tables::CREDENTIALS),
                        params![keys::PICTURE],
                    )?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Current access token, if logged in.
    pub fn access_token(&self) -> Result<Option<String>> {
        let conn = lock(&self.conn)?;
        Ok(conn
            .query_row(
                &format!("SELECT value FROM {} WHERE key = ?1", tables::CREDENTIALS),
                params![keys::ACCESS_TOKEN],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Replace the access token after a refresh.
    ///
    /// Fails with `NotAuthenticated` if the session was cleared in the
    /// meantime, so a late refresh cannot resurrect a logged-out session.
    pub fn update_access_token(&self, access_token: &str) -> Result<()> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        let updated = tx.execute(
            &format!(
                "UPDATE {} SET value = ?2 WHERE key = ?1
                 AND EXISTS (SELECT 1 FROM {} WHERE key = ?3)",
                tables::CREDENTIALS,
                tables::CREDENTIALS
            ),
            params![keys::ACCESS_TOKEN, access_token, keys::REFRESH_TOKEN],
        )?;
        if updated == 0 {
            return Err(AppError::NotAuthenticated);
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove tokens and profile. The device identity survives.
    pub fn clear(&self) -> Result<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            &format!("DELETE FROM {} WHERE key != ?1", tables::CREDENTIALS),
            params![keys::DEVICE_ID],
        )?;
        tracing::info!("Credentials cleared");
        Ok(())
    }

    pub fn is_logged_in(&self) -> Result<bool> {
        Ok(self.access_token()?.is_some())
    }
}

/// 128 random bits, hex encoded.
fn generate_device_id() -> Result<String> {
    let mut bytes = [0u8; 16];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG unavailable")))?;
    Ok(hex::encode(bytes))
}
