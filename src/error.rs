// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types shared by the stores and services.

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The cloud answered with a structured, non-retryable failure.
    #[error("Cloud API error: {0}")]
    CloudApi(String),

    /// Network failure, timeout, or a server error without a parseable body.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Access token expired")]
    TokenExpired,

    #[error("Device session revoked")]
    DeviceRevoked,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Error code the cloud uses to signal that this device's session is gone.
    pub const DEVICE_REVOKED_CODE: &'static str = "DEVICE_REVOKED";

    /// Error code the cloud uses for an expired access token.
    pub const TOKEN_EXPIRED_CODE: &'static str = "TOKEN_EXPIRED";

    /// Network blips and unparseable server failures; retried on the next
    /// poll attempt or sync pass.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Transport(_))
    }

    /// Outcomes that require a fresh device login before anything else.
    pub fn is_auth_terminal(&self) -> bool {
        matches!(self, AppError::DeviceRevoked | AppError::NotAuthenticated)
    }

    pub fn is_token_expired(&self) -> bool {
        matches!(self, AppError::TokenExpired)
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, AppError>;
