// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is honored for local development.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cloud API base URL (no trailing slash)
    pub api_base_url: String,
    /// Directory holding the credential, record and checkpoint databases
    pub data_dir: PathBuf,
    /// Human-readable device name sent when requesting a user code
    pub device_name: String,
    /// Per-request HTTP timeout
    pub http_timeout: Duration,
    /// Minimum age of a FAILED record's last attempt before a pass retries it
    pub failed_retry_cooldown: Duration,
    /// How often the checkpoint task evaluates the save decision
    pub checkpoint_tick: Duration,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            data_dir: PathBuf::from("./velocoach-test-data"),
            device_name: "Test device".to_string(),
            http_timeout: Duration::from_secs(5),
            failed_retry_cooldown: Duration::ZERO,
            checkpoint_tick: Duration::from_secs(15),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            api_base_url: env::var("VELOCOACH_API_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "https://api.velocoach.app".to_string()),
            data_dir: env::var("VELOCOACH_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./velocoach-data")),
            device_name: env::var("VELOCOACH_DEVICE_NAME")
                .map(|v| v.trim().to_string())
                .unwrap_or_else(|_| "VeloCoach device".to_string()),
            http_timeout: Duration::from_secs(secs_var("VELOCOACH_HTTP_TIMEOUT_SECS", 30)?),
            failed_retry_cooldown: Duration::from_secs(secs_var(
                "VELOCOACH_FAILED_RETRY_COOLDOWN_SECS",
                0,
            )?),
            checkpoint_tick: Duration::from_secs(secs_var("VELOCOACH_CHECKPOINT_TICK_SECS", 15)?),
        })
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join("credentials.sqlite3")
    }

    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join("records.sqlite3")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.data_dir.join("checkpoint.sqlite3")
    }
}

/// Read a whole-seconds variable, falling back to `default` when unset.
fn secs_var(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("VELOCOACH_API_URL", "https://sync.example.com/");
        env::set_var("VELOCOACH_FAILED_RETRY_COOLDOWN_SECS", "300");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.api_base_url, "https://sync.example.com");
        assert_eq!(config.failed_retry_cooldown, Duration::from_secs(300));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(
            config.records_path(),
            config.data_dir.join("records.sqlite3")
        );

        env::remove_var("VELOCOACH_API_URL");
        env::remove_var("VELOCOACH_FAILED_RETRY_COOLDOWN_SECS");
    }

    #[test]
    fn test_secs_var_rejects_garbage() {
        env::set_var("VELOCOACH_TEST_BAD_SECS", "soon");
        let err = secs_var("VELOCOACH_TEST_BAD_SECS", 5).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("VELOCOACH_TEST_BAD_SECS", _)));
        env::remove_var("VELOCOACH_TEST_BAD_SECS");

        assert_eq!(secs_var("VELOCOACH_TEST_UNSET_SECS", 7).unwrap(), 7);
    }
}
