// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use futures_util::future::BoxFuture;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use velocoach::config::Config;
use velocoach::db::{CheckpointStore, CredentialStore, RecordStore};
use velocoach::models::Credentials;
use velocoach::services::{CloudClient, DeviceAuthFlow, SleepFn};
use velocoach::AppContext;
use wiremock::MockServer;

/// Sleep that returns immediately and records every requested duration.
#[allow(dead_code)]
pub fn recording_sleep() -> (SleepFn, Arc<Mutex<Vec<Duration>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = calls.clone();
    let sleep: SleepFn = Arc::new(move |duration: Duration| -> BoxFuture<'static, ()> {
        recorded.lock().unwrap().push(duration);
        Box::pin(async {})
    });
    (sleep, calls)
}

/// Cloud client pointed at the mock server.
#[allow(dead_code)]
pub fn test_client(server: &MockServer) -> CloudClient {
    CloudClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
}

/// Context with in-memory stores and a zero-delay auth flow.
#[allow(dead_code)]
pub fn test_context(server: &MockServer) -> AppContext {
    let config = Config {
        api_base_url: server.uri(),
        ..Config::default()
    };
    let api = test_client(server);
    let credentials = CredentialStore::open_in_memory().unwrap();
    let (sleep, _) = recording_sleep();
    let auth = DeviceAuthFlow::with_sleep(api.clone(), credentials.clone(), "Test trainer", sleep);

    AppContext::with_stores(
        config,
        api,
        credentials,
        RecordStore::open_in_memory().unwrap(),
        CheckpointStore::open_in_memory().unwrap(),
        auth,
    )
}

#[allow(dead_code)]
pub fn test_credentials(access_token: &str) -> Credentials {
    Credentials {
        access_token: access_token.to_string(),
        refresh_token: "refresh-token".to_string(),
        user_id: "42".to_string(),
        email: "rider@example.com".to_string(),
        display_name: "Test Rider".to_string(),
        picture: None,
    }
}

#[allow(dead_code)]
pub fn ok_body() -> serde_json::Value {
    json!({ "success": true, "data": {} })
}

#[allow(dead_code)]
pub fn pending_body() -> serde_json::Value {
    json!({ "success": false, "status": "authorization_pending" })
}

#[allow(dead_code)]
pub fn device_code_body(interval: Option<u64>) -> serde_json::Value {
    json!({
        "success": true,
        "data": {
            "device_code": "dev-code-secret",
            "user_code": "WDJB-MJHT",
            "verification_uri": "https://velocoach.app/device",
            "expires_in": 900,
            "interval": interval,
        }
    })
}

#[allow(dead_code)]
pub fn session_body() -> serde_json::Value {
    json!({
        "success": true,
        "data": {
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "user": {
                "id": 42,
                "email": "rider@example.com",
                "name": "Test Rider",
                "picture": null,
            }
        }
    })
}
