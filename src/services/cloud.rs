// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloud API client for device login, token refresh and record upload.
//!
//! Handles:
//! - Device code request and token polling
//! - Access token refresh
//! - Record uploads (bearer token + device id header)
//! - Classification of responses into transient / expired / revoked / failed

use crate::error::AppError;
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Endpoint paths, relative to the API base URL.
pub mod endpoints {
    pub const DEVICE_CODE: &str = "/auth/device/code";
    pub const DEVICE_TOKEN: &str = "/auth/device/token";
    pub const REFRESH: &str = "/auth/refresh";
    pub const SYNC_RIDE: &str = "/sync/ride";
    pub const SYNC_RIDE_FULL: &str = "/sync/ride-full";
    pub const SYNC_DRILL: &str = "/sync/drill";
    pub const SYNC_ACHIEVEMENTS: &str = "/sync/achievements";
}

/// Header carrying the stable device identity on authenticated calls.
pub const DEVICE_ID_HEADER: &str = "X-Device-Id";

/// Common response wrapper: `{success, data?, error?, code?, status?}`.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    error: Option<String>,
    code: Option<String>,
    status: Option<String>,
}

/// Response from the device code endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeGrant {
    /// Secret code sent back while polling (never shown or logged)
    pub device_code: String,
    /// Short code the user types into the browser
    pub user_code: String,
    pub verification_uri: String,
    /// Seconds until the code expires
    pub expires_in: u64,
    /// Suggested polling interval in seconds
    #[serde(default)]
    pub interval: Option<u64>,
}

/// Session payload returned once the user approves the device.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSession {
    pub access_token: String,
    pub refresh_token: String,
    pub user: SessionUser,
}

/// Profile fields of the signed-in user.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionUser {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshData {
    access_token: String,
}

/// Interpretation of one device token poll.
#[derive(Debug)]
pub enum PollOutcome {
    Granted(DeviceSession),
    Pending,
    SlowDown,
    Expired,
    AccessDenied,
    /// Network failure or a server error without a parseable body
    Transient(String),
    /// Any other parseable error
    Failed(String),
}

/// Cloud API client.
#[derive(Clone)]
pub struct CloudClient {
    http: reqwest::Client,
    base_url: String,
}

impl CloudClient {
    /// Create a client for the given base URL.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Request a device/user code pair to start a device login.
    pub async fn request_device_code(
        &self,
        device_id: &str,
        device_name: &str,
    ) -> Result<DeviceCodeGrant, AppError> {
        let body = serde_json::json!({
            "device_id": device_id,
            "device_name": device_name,
        });

        let response = self
            .http
            .post(self.url(endpoints::DEVICE_CODE))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("Device code request failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        let envelope: ApiEnvelope<DeviceCodeGrant> = serde_json::from_str(&text)
            .map_err(|_| AppError::CloudApi(format!("HTTP {}: unparseable response", status)))?;

        match envelope.data {
            Some(grant) if envelope.success && status.is_success() => Ok(grant),
            _ => Err(AppError::CloudApi(
                envelope
                    .error
                    .unwrap_or_else(|| format!("Device code request rejected (HTTP {})", status)),
            )),
        }
    }

    /// Poll once for the outcome of a device login.
    pub async fn poll_device_token(&self, device_code: &str, device_id: &str) -> PollOutcome {
        let body = serde_json::json!({
            "device_code": device_code,
            "device_id": device_id,
        });

        let response = match self
            .http
            .post(self.url(endpoints::DEVICE_TOKEN))
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return PollOutcome::Transient(e.to_string()),
        };

        let status = response.status();
        match response.text().await {
            Ok(text) => classify_poll_response(status, &text),
            Err(e) => PollOutcome::Transient(e.to_string()),
        }
    }

    /// Exchange the refresh token for a new access token.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, AppError> {
        let body = serde_json::json!({ "refresh_token": refresh_token });

        let response = self
            .http
            .post(self.url(endpoints::REFRESH))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("Token refresh request failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        let envelope: ApiEnvelope<RefreshData> = match serde_json::from_str(&text) {
            Ok(env) => env,
            Err(_) if status.is_server_error() => {
                return Err(AppError::Transport(format!("Token refresh failed: HTTP {}", status)))
            }
            Err(e) => {
                return Err(AppError::CloudApi(format!(
                    "Token refresh response unparseable (HTTP {}): {}",
                    status, e
                )))
            }
        };

        if envelope.code.as_deref() == Some(AppError::DEVICE_REVOKED_CODE) {
            return Err(AppError::DeviceRevoked);
        }

        match envelope.data {
            Some(data) if envelope.success && status.is_success() => Ok(data.access_token),
            _ => Err(AppError::CloudApi(
                envelope
                    .error
                    .unwrap_or_else(|| format!("Token refresh rejected (HTTP {})", status)),
            )),
        }
    }

    /// Upload one JSON body to a sync endpoint.
    pub async fn upload(
        &self,
        path: &str,
        access_token: &str,
        device_id: &str,
        body: &serde_json::Value,
    ) -> Result<(), AppError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(access_token)
            .header(DEVICE_ID_HEADER, device_id)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::Transport(e.to_string()))?;

        classify_upload_response(status, &text)
    }
}

/// Interpret a device token poll response.
pub fn classify_poll_response(status: StatusCode, body: &str) -> PollOutcome {
    let envelope: ApiEnvelope<serde_json::Value> = match serde_json::from_str(body) {
        Ok(env) => env,
        Err(_) => {
            return PollOutcome::Transient(format!("HTTP {}: unparseable response", status));
        }
    };

    // Only a successful envelope carries a session; other payloads are ignored
    if envelope.success {
        if let Some(data) = envelope.data {
            return match serde_json::from_value::<DeviceSession>(data) {
                Ok(session) => PollOutcome::Granted(session),
                Err(e) => PollOutcome::Failed(format!("Malformed device session: {}", e)),
            };
        }
    }

    let marker = envelope.status.as_deref().or(envelope.error.as_deref());
    match marker {
        Some("authorization_pending") => PollOutcome::Pending,
        Some("slow_down") => PollOutcome::SlowDown,
        Some("expired") | Some("expired_token") => PollOutcome::Expired,
        Some("access_denied") => PollOutcome::AccessDenied,
        _ => PollOutcome::Failed(
            envelope
                .error
                .unwrap_or_else(|| format!("Unexpected device token response (HTTP {})", status)),
        ),
    }
}

/// Interpret a sync upload response.
pub fn classify_upload_response(status: StatusCode, body: &str) -> Result<(), AppError> {
    let envelope: ApiEnvelope<serde_json::Value> = match serde_json::from_str(body) {
        Ok(env) => env,
        Err(_) if status == StatusCode::UNAUTHORIZED => return Err(AppError::TokenExpired),
        Err(_) if status.is_server_error() => {
            return Err(AppError::Transport(format!("HTTP {}: unparseable response", status)))
        }
        Err(e) => {
            return Err(AppError::CloudApi(format!(
                "HTTP {}: unparseable response: {}",
                status, e
            )))
        }
    };

    match envelope.code.as_deref() {
        Some(AppError::DEVICE_REVOKED_CODE) => return Err(AppError::DeviceRevoked),
        Some(AppError::TOKEN_EXPIRED_CODE) => return Err(AppError::TokenExpired),
        _ => {}
    }

    if status == StatusCode::UNAUTHORIZED {
        return Err(AppError::TokenExpired);
    }

    if status.is_success() && envelope.success {
        return Ok(());
    }

    Err(AppError::CloudApi(
        envelope
            .error
            .unwrap_or_else(|| format!("Upload rejected (HTTP {})", status)),
    ))
}

/// Accept ids sent either as JSON strings or numbers.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_success_with_session() {
        let body = r#"{"success":true,"data":{"access_token":"a","refresh_token":"r",
            "user":{"id":7,"email":"rider@example.com","name":"Rider"}}}"#;
        match classify_poll_response(StatusCode::OK, body) {
            PollOutcome::Granted(session) => {
                assert_eq!(session.user.id, "7");
                assert_eq!(session.user.picture, None);
            }
            other => panic!("expected Granted, got {:?}", other),
        }
    }

    #[test]
    fn test_poll_status_markers() {
        let cases = [
            (r#"{"success":false,"status":"authorization_pending"}"#, "pending"),
            (r#"{"success":false,"status":"slow_down"}"#, "slow_down"),
            (r#"{"success":false,"status":"expired"}"#, "expired"),
            (r#"{"success":false,"error":"access_denied"}"#, "denied"),
        ];
        for (body, expected) in cases {
            let outcome = classify_poll_response(StatusCode::BAD_REQUEST, body);
            let got = match outcome {
                PollOutcome::Pending => "pending",
                PollOutcome::SlowDown => "slow_down",
                PollOutcome::Expired => "expired",
                PollOutcome::AccessDenied => "denied",
                other => panic!("unexpected {:?} for {}", other, body),
            };
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn test_poll_unparseable_is_transient() {
        let outcome = classify_poll_response(StatusCode::BAD_GATEWAY, "<html>502</html>");
        assert!(matches!(outcome, PollOutcome::Transient(_)));
    }

    #[test]
    fn test_poll_success_without_session_is_failure() {
        let outcome = classify_poll_response(StatusCode::OK, r#"{"success":true}"#);
        assert!(matches!(outcome, PollOutcome::Failed(_)));
    }

    #[test]
    fn test_poll_other_error_is_failure() {
        let body = r#"{"success":false,"error":"invalid_device"}"#;
        match classify_poll_response(StatusCode::BAD_REQUEST, body) {
            PollOutcome::Failed(msg) => assert_eq!(msg, "invalid_device"),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn test_upload_classification() {
        assert!(classify_upload_response(StatusCode::OK, r#"{"success":true}"#).is_ok());

        let revoked = classify_upload_response(
            StatusCode::FORBIDDEN,
            r#"{"success":false,"error":"revoked","code":"DEVICE_REVOKED"}"#,
        );
        assert!(matches!(revoked, Err(AppError::DeviceRevoked)));

        let expired = classify_upload_response(StatusCode::UNAUTHORIZED, r#"{"success":false}"#);
        assert!(matches!(expired, Err(AppError::TokenExpired)));

        let expired_code = classify_upload_response(
            StatusCode::FORBIDDEN,
            r#"{"success":false,"code":"TOKEN_EXPIRED"}"#,
        );
        assert!(matches!(expired_code, Err(AppError::TokenExpired)));

        let server = classify_upload_response(StatusCode::SERVICE_UNAVAILABLE, "oops");
        assert!(matches!(server, Err(AppError::Transport(_))));

        let rejected = classify_upload_response(
            StatusCode::BAD_REQUEST,
            r#"{"success":false,"error":"bad ride"}"#,
        );
        assert!(matches!(rejected, Err(AppError::CloudApi(ref m)) if m == "bad ride"));

        let soft_fail = classify_upload_response(StatusCode::OK, r#"{"success":false}"#);
        assert!(matches!(soft_fail, Err(AppError::CloudApi(_))));
    }
}
