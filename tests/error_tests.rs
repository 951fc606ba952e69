// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use reqwest::StatusCode;
use velocoach::error::AppError;
use velocoach::services::cloud::{classify_poll_response, classify_upload_response};
use velocoach::services::PollOutcome;

#[test]
fn test_error_classification() {
    assert!(AppError::Transport("timeout".to_string()).is_transient());
    assert!(!AppError::CloudApi("bad request".to_string()).is_transient());

    assert!(AppError::DeviceRevoked.is_auth_terminal());
    assert!(AppError::NotAuthenticated.is_auth_terminal());
    assert!(!AppError::TokenExpired.is_auth_terminal());

    assert!(AppError::TokenExpired.is_token_expired());
    assert!(!AppError::DeviceRevoked.is_token_expired());
}

#[test]
fn test_upload_revoked_wins_over_401() {
    let body = format!(
        r#"{{"success":false,"error":"gone","code":"{}"}}"#,
        AppError::DEVICE_REVOKED_CODE
    );
    let err = classify_upload_response(StatusCode::UNAUTHORIZED, &body).unwrap_err();
    assert!(matches!(err, AppError::DeviceRevoked));
}

#[test]
fn test_upload_token_expiry_forms() {
    let err = classify_upload_response(StatusCode::UNAUTHORIZED, "").unwrap_err();
    assert!(err.is_token_expired());

    let body = r#"{"success":false,"code":"TOKEN_EXPIRED"}"#;
    let err = classify_upload_response(StatusCode::FORBIDDEN, body).unwrap_err();
    assert!(err.is_token_expired());
}

#[test]
fn test_upload_generic_failures() {
    let err = classify_upload_response(StatusCode::BAD_GATEWAY, "<html>").unwrap_err();
    assert!(err.is_transient());

    let body = r#"{"success":false,"error":"Invalid ride payload"}"#;
    let err = classify_upload_response(StatusCode::UNPROCESSABLE_ENTITY, body).unwrap_err();
    assert!(matches!(err, AppError::CloudApi(ref m) if m == "Invalid ride payload"));

    // HTTP 200 without success=true is not an upload
    let err = classify_upload_response(StatusCode::OK, r#"{"success":false}"#).unwrap_err();
    assert!(matches!(err, AppError::CloudApi(_)));

    assert!(classify_upload_response(StatusCode::OK, r#"{"success":true}"#).is_ok());
}

#[test]
fn test_poll_response_markers() {
    let pending = r#"{"success":false,"status":"authorization_pending"}"#;
    assert!(matches!(
        classify_poll_response(StatusCode::BAD_REQUEST, pending),
        PollOutcome::Pending
    ));

    let slow = r#"{"success":false,"error":"slow_down"}"#;
    assert!(matches!(
        classify_poll_response(StatusCode::BAD_REQUEST, slow),
        PollOutcome::SlowDown
    ));

    assert!(matches!(
        classify_poll_response(StatusCode::SERVICE_UNAVAILABLE, "oops"),
        PollOutcome::Transient(_)
    ));

    let other = r#"{"success":false,"error":"invalid_client"}"#;
    assert!(matches!(
        classify_poll_response(StatusCode::BAD_REQUEST, other),
        PollOutcome::Failed(ref m) if m == "invalid_client"
    ));
}

#[test]
fn test_poll_marker_wins_over_unrelated_data() {
    let pending = r#"{"success":false,"status":"authorization_pending","data":{}}"#;
    assert!(matches!(
        classify_poll_response(StatusCode::BAD_REQUEST, pending),
        PollOutcome::Pending
    ));

    let denied = r#"{"success":false,"error":"access_denied","data":{"hint":"ask again"}}"#;
    assert!(matches!(
        classify_poll_response(StatusCode::FORBIDDEN, denied),
        PollOutcome::AccessDenied
    ));

    let other = r#"{"success":false,"error":"invalid_client","data":[1,2]}"#;
    assert!(matches!(
        classify_poll_response(StatusCode::BAD_REQUEST, other),
        PollOutcome::Failed(ref m) if m == "invalid_client"
    ));

    // A successful envelope without a usable session stops the flow
    let malformed = r#"{"success":true,"data":{"access_token":"a"}}"#;
    assert!(matches!(
        classify_poll_response(StatusCode::OK, malformed),
        PollOutcome::Failed(_)
    ));
}
