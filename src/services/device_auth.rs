// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Device-code login for a device without a browser.
//!
//! 1. Request a device/user code pair from the cloud
//! 2. Show the user code and verification URI (the user approves elsewhere)
//! 3. Poll until the cloud reports a terminal outcome
//! 4. On approval, store tokens and profile in the credential store
//!
//! The flow is a small state machine (`DeviceAuthState` + `AuthEvent`).
//! `cancel()` is cooperative: it bumps a generation counter, and the poll loop
//! drops any result that belongs to an older generation.

use crate::db::CredentialStore;
use crate::error::AppError;
use crate::models::Credentials;
use crate::services::cloud::{CloudClient, DeviceSession, PollOutcome};
use futures_util::future::BoxFuture;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Poll attempt budget (about ten minutes at the default interval).
pub const MAX_POLL_ATTEMPTS: u32 = 120;
/// Interval used when the server does not suggest one.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
/// Attempts after which the interval starts ratcheting up.
pub const BACKOFF_AFTER_ATTEMPTS: u32 = 20;
pub const BACKOFF_STEP_MS: u64 = 1_000;
/// Ceiling for the ratchet (a `slow_down` bump may exceed it).
pub const MAX_POLL_INTERVAL_MS: u64 = 8_000;
/// Largest server-suggested interval honored.
pub const MAX_SERVER_POLL_INTERVAL_MS: u64 = 60_000;

/// Observable state of the login flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "ui/src/generated/")
)]
pub enum DeviceAuthState {
    Idle,
    RequestingCode,
    WaitingForUser {
        user_code: String,
        verification_uri: String,
        expires_in: u64,
    },
    Polling {
        user_code: String,
        verification_uri: String,
        attempts_remaining: u32,
    },
    Success {
        email: String,
        name: String,
    },
    Error {
        message: String,
    },
    Expired,
    AccessDenied,
}

/// Inputs that move the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    Start,
    CodeIssued {
        user_code: String,
        verification_uri: String,
        expires_in: u64,
    },
    CodeRequestFailed(String),
    PollAttempt {
        attempts_remaining: u32,
    },
    Granted {
        email: String,
        name: String,
    },
    CodeExpired,
    Denied,
    Failed(String),
    Cancel,
}

impl DeviceAuthState {
    /// Transition function. Returns `None` when `event` is not valid in the
    /// current state.
    pub fn apply(&self, event: AuthEvent) -> Option<DeviceAuthState> {
        use AuthEvent as E;
        use DeviceAuthState as S;

        match (self, event) {
            (_, E::Cancel) => Some(S::Idle),

            (state, E::Start) if !state.is_active() => Some(S::RequestingCode),

            (
                S::RequestingCode,
                E::CodeIssued {
                    user_code,
                    verification_uri,
                    expires_in,
                },
            ) => Some(S::WaitingForUser {
                user_code,
                verification_uri,
                expires_in,
            }),
            (S::RequestingCode, E::CodeRequestFailed(message)) => Some(S::Error { message }),

            (
                S::WaitingForUser {
                    user_code,
                    verification_uri,
                    ..
                }
                | S::Polling {
                    user_code,
                    verification_uri,
                    ..
                },
                E::PollAttempt { attempts_remaining },
            ) => Some(S::Polling {
                user_code: user_code.clone(),
                verification_uri: verification_uri.clone(),
                attempts_remaining,
            }),

            (S::WaitingForUser { .. } | S::Polling { .. }, event) => match event {
                E::Granted { email, name } => Some(S::Success { email, name }),
                E::CodeExpired => Some(S::Expired),
                E::Denied => Some(S::AccessDenied),
                E::Failed(message) => Some(S::Error { message }),
                _ => None,
            },

            _ => None,
        }
    }

    /// A code request or poll loop is in flight.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            DeviceAuthState::RequestingCode
                | DeviceAuthState::WaitingForUser { .. }
                | DeviceAuthState::Polling { .. }
        )
    }

    /// The flow stopped with an outcome the user has to act on.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeviceAuthState::Success { .. }
                | DeviceAuthState::Error { .. }
                | DeviceAuthState::Expired
                | DeviceAuthState::AccessDenied
        )
    }
}

/// Starting interval from the server's suggestion in seconds.
pub fn initial_poll_interval(server_secs: Option<u64>) -> u64 {
    match server_secs {
        Some(secs) if secs > 0 => secs
            .saturating_mul(1_000)
            .min(MAX_SERVER_POLL_INTERVAL_MS),
        _ => DEFAULT_POLL_INTERVAL_MS,
    }
}

/// Next interval after `attempts_made` polls: unchanged for the first
/// attempts, then +1s per attempt up to the ceiling. Never decreases.
pub fn next_poll_interval(current_ms: u64, attempts_made: u32) -> u64 {
    if attempts_made < BACKOFF_AFTER_ATTEMPTS || current_ms >= MAX_POLL_INTERVAL_MS {
        return current_ms;
    }
    (current_ms + BACKOFF_STEP_MS).min(MAX_POLL_INTERVAL_MS)
}

/// Interval after a `slow_down` response.
pub fn slow_down_interval(current_ms: u64) -> u64 {
    (current_ms as f64 * 1.5) as u64
}

/// Injected sleep so tests can run the poll loop without real delays.
pub type SleepFn = Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

/// Sleep on the tokio timer.
pub fn tokio_sleep() -> SleepFn {
    Arc::new(|duration: Duration| -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    })
}

/// Device code issued by the cloud for the current flow.
#[derive(Clone)]
struct PendingCode {
    device_code: String,
    interval_ms: u64,
}

/// Generation counter plus the live device code, guarded together with the
/// published state so a transition and a cancel can never interleave.
struct FlowControl {
    generation: u64,
    pending: Option<PendingCode>,
}

struct FlowInner {
    api: CloudClient,
    credentials: CredentialStore,
    device_name: String,
    sleep: SleepFn,
    control: Mutex<FlowControl>,
    state_tx: watch::Sender<DeviceAuthState>,
}

/// Device-code login flow. Cheap to clone; clones share state, so
/// `cancel()` can be called from another task than the one polling.
#[derive(Clone)]
pub struct DeviceAuthFlow {
    inner: Arc<FlowInner>,
}

impl DeviceAuthFlow {
    pub fn new(api: CloudClient, credentials: CredentialStore, device_name: &str) -> Self {
        Self::with_sleep(api, credentials, device_name, tokio_sleep())
    }

    pub fn with_sleep(
        api: CloudClient,
        credentials: CredentialStore,
        device_name: &str,
        sleep: SleepFn,
    ) -> Self {
        let (state_tx, _) = watch::channel(DeviceAuthState::Idle);
        Self {
            inner: Arc::new(FlowInner {
                api,
                credentials,
                device_name: device_name.to_string(),
                sleep,
                control: Mutex::new(FlowControl {
                    generation: 0,
                    pending: None,
                }),
                state_tx,
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> DeviceAuthState {
        self.inner.state_tx.borrow().clone()
    }

    /// Watch state changes (for the UI).
    pub fn subscribe(&self) -> watch::Receiver<DeviceAuthState> {
        self.inner.state_tx.subscribe()
    }

    /// Request a user code. Returns the resulting state: `WaitingForUser` on
    /// success, `Error` if the request failed. Network errors are not retried.
    pub async fn start(&self) -> DeviceAuthState {
        let generation = {
            let Ok(mut control) = self.control() else {
                return self.state();
            };
            let current = self.state();
            let Some(next) = current.apply(AuthEvent::Start) else {
                tracing::warn!(state = ?current, "Device login already in progress");
                return current;
            };
            control.generation += 1;
            control.pending = None;
            self.publish(next);
            control.generation
        };

        let device_id = match self.inner.credentials.device_id() {
            Ok(id) => id,
            Err(e) => {
                self.transition(generation, AuthEvent::CodeRequestFailed(e.to_string()), |_| {});
                return self.state();
            }
        };

        match self
            .inner
            .api
            .request_device_code(&device_id, &self.inner.device_name)
            .await
        {
            Ok(grant) => {
                let interval_ms = initial_poll_interval(grant.interval);
                let pending = PendingCode {
                    device_code: grant.device_code,
                    interval_ms,
                };
                let applied = self.transition(
                    generation,
                    AuthEvent::CodeIssued {
                        user_code: grant.user_code,
                        verification_uri: grant.verification_uri,
                        expires_in: grant.expires_in,
                    },
                    |control| control.pending = Some(pending),
                );
                if applied {
                    tracing::info!(
                        expires_in = grant.expires_in,
                        interval_ms,
                        "Device code issued, waiting for user"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Device code request failed");
                self.transition(generation, AuthEvent::CodeRequestFailed(e.to_string()), |_| {});
            }
        }

        self.state()
    }

    /// Poll until the login reaches a terminal outcome.
    ///
    /// Returns the stored credentials on approval; `None` on expiry, denial,
    /// error or cancellation (see `state()` for which).
    pub async fn poll(&self) -> Option<Credentials> {
        let (generation, pending) = {
            let control = self.control().ok()?;
            match &control.pending {
                Some(p) => (control.generation, p.clone()),
                None => {
                    tracing::warn!("poll() called without an issued device code");
                    return None;
                }
            }
        };

        let device_id = match self.inner.credentials.device_id() {
            Ok(id) => id,
            Err(e) => {
                self.finish(generation, AuthEvent::Failed(e.to_string()));
                return None;
            }
        };

        let mut interval_ms = pending.interval_ms;
        let mut attempts_made: u32 = 0;

        while attempts_made < MAX_POLL_ATTEMPTS {
            (self.inner.sleep)(Duration::from_millis(interval_ms)).await;

            attempts_made += 1;
            let attempts_remaining = MAX_POLL_ATTEMPTS - attempts_made;
            if !self.transition(
                generation,
                AuthEvent::PollAttempt { attempts_remaining },
                |_| {},
            ) {
                tracing::info!("Device login cancelled");
                return None;
            }

            let outcome = self
                .inner
                .api
                .poll_device_token(&pending.device_code, &device_id)
                .await;

            if !self.is_current(generation) {
                tracing::debug!("Discarding poll result after cancellation");
                return None;
            }

            match outcome {
                PollOutcome::Granted(session) => return self.complete(generation, session),
                PollOutcome::Pending => {
                    tracing::debug!(attempts_remaining, "Authorization pending");
                }
                PollOutcome::SlowDown => {
                    interval_ms = slow_down_interval(interval_ms);
                    tracing::info!(interval_ms, "Server asked to slow down");
                }
                PollOutcome::Expired => {
                    self.finish(generation, AuthEvent::CodeExpired);
                    return None;
                }
                PollOutcome::AccessDenied => {
                    self.finish(generation, AuthEvent::Denied);
                    return None;
                }
                PollOutcome::Transient(message) => {
                    tracing::warn!(error = %message, attempts_remaining, "Transient poll failure, retrying");
                }
                PollOutcome::Failed(message) => {
                    tracing::warn!(error = %message, "Device login failed");
                    self.finish(generation, AuthEvent::Failed(message));
                    return None;
                }
            }

            interval_ms = next_poll_interval(interval_ms, attempts_made);
        }

        tracing::info!("Device login attempt budget exhausted");
        self.finish(generation, AuthEvent::CodeExpired);
        None
    }

    /// Stop polling and reset to `Idle`, discarding the device code.
    pub fn cancel(&self) {
        let Ok(mut control) = self.control() else {
            return;
        };
        control.generation += 1;
        control.pending = None;
        self.publish(DeviceAuthState::Idle);
        tracing::info!("Device login reset to idle");
    }

    // ─── Internals ───────────────────────────────────────────────────────

    fn control(&self) -> Result<MutexGuard<'_, FlowControl>, AppError> {
        self.inner
            .control
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Auth flow lock poisoned")))
    }

    fn publish(&self, state: DeviceAuthState) {
        tracing::debug!(state = ?state, "Device login state");
        self.inner.state_tx.send_replace(state);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.control()
            .map(|c| c.generation == generation)
            .unwrap_or(false)
    }

    /// Apply `event` if `generation` is still current. `update` runs under
    /// the same lock, before the new state is published.
    fn transition(
        &self,
        generation: u64,
        event: AuthEvent,
        update: impl FnOnce(&mut FlowControl),
    ) -> bool {
        let Ok(mut control) = self.control() else {
            return false;
        };
        if control.generation != generation {
            return false;
        }
        let current = self.state();
        match current.apply(event.clone()) {
            Some(next) => {
                update(&mut *control);
                self.publish(next);
                true
            }
            None => {
                tracing::warn!(state = ?current, event = ?event, "Ignoring invalid auth transition");
                false
            }
        }
    }

    /// Terminal transition; the device code is discarded.
    fn finish(&self, generation: u64, event: AuthEvent) {
        self.transition(generation, event, |control| control.pending = None);
    }

    /// Persist the session and move to `Success`, unless cancelled first.
    fn complete(&self, generation: u64, session: DeviceSession) -> Option<Credentials> {
        let credentials = Credentials {
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            user_id: session.user.id,
            email: session.user.email,
            display_name: session.user.name,
            picture: session.user.picture,
        };

        let mut control = self.control().ok()?;
        if control.generation != generation {
            return None;
        }

        if let Err(e) = self.inner.credentials.save(&credentials) {
            tracing::error!(error = %e, "Failed to store credentials");
            control.pending = None;
            self.publish(DeviceAuthState::Error {
                message: format!("Failed to store credentials: {}", e),
            });
            return None;
        }

        control.pending = None;
        self.publish(DeviceAuthState::Success {
            email: credentials.email.clone(),
            name: credentials.display_name.clone(),
        });
        tracing::info!(user_id = %credentials.user_id, "Device login complete");
        Some(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiting() -> DeviceAuthState {
        DeviceAuthState::WaitingForUser {
            user_code: "ABCD-1234".to_string(),
            verification_uri: "https://velocoach.app/device".to_string(),
            expires_in: 600,
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let s = DeviceAuthState::Idle.apply(AuthEvent::Start).unwrap();
        assert_eq!(s, DeviceAuthState::RequestingCode);

        let s = s
            .apply(AuthEvent::CodeIssued {
                user_code: "ABCD-1234".to_string(),
                verification_uri: "https://velocoach.app/device".to_string(),
                expires_in: 600,
            })
            .unwrap();
        assert_eq!(s, waiting());

        let s = s
            .apply(AuthEvent::PollAttempt {
                attempts_remaining: 119,
            })
            .unwrap();
        assert_eq!(
            s,
            DeviceAuthState::Polling {
                user_code: "ABCD-1234".to_string(),
                verification_uri: "https://velocoach.app/device".to_string(),
                attempts_remaining: 119,
            }
        );

        let s = s
            .apply(AuthEvent::Granted {
                email: "rider@example.com".to_string(),
                name: "Rider".to_string(),
            })
            .unwrap();
        assert!(s.is_terminal());
    }

    #[test]
    fn test_terminal_outcomes_from_polling() {
        assert_eq!(
            waiting().apply(AuthEvent::CodeExpired),
            Some(DeviceAuthState::Expired)
        );
        assert_eq!(
            waiting().apply(AuthEvent::Denied),
            Some(DeviceAuthState::AccessDenied)
        );
        assert_eq!(
            waiting().apply(AuthEvent::Failed("boom".to_string())),
            Some(DeviceAuthState::Error {
                message: "boom".to_string()
            })
        );
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        assert_eq!(
            DeviceAuthState::Idle.apply(AuthEvent::PollAttempt {
                attempts_remaining: 3
            }),
            None
        );
        assert_eq!(
            DeviceAuthState::Idle.apply(AuthEvent::Granted {
                email: String::new(),
                name: String::new()
            }),
            None
        );
        assert_eq!(waiting().apply(AuthEvent::Start), None);
        assert_eq!(
            DeviceAuthState::RequestingCode.apply(AuthEvent::CodeExpired),
            None
        );
    }

    #[test]
    fn test_cancel_always_idle_and_restart_after_terminal() {
        for state in [
            DeviceAuthState::RequestingCode,
            waiting(),
            DeviceAuthState::Expired,
            DeviceAuthState::AccessDenied,
        ] {
            assert_eq!(state.apply(AuthEvent::Cancel), Some(DeviceAuthState::Idle));
        }
        assert_eq!(
            DeviceAuthState::Expired.apply(AuthEvent::Start),
            Some(DeviceAuthState::RequestingCode)
        );
    }

    #[test]
    fn test_initial_poll_interval() {
        assert_eq!(initial_poll_interval(None), DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(initial_poll_interval(Some(0)), DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(initial_poll_interval(Some(3)), 3_000);
        assert_eq!(initial_poll_interval(Some(600)), MAX_SERVER_POLL_INTERVAL_MS);
        assert_eq!(
            initial_poll_interval(Some(18_446_744_073_709_552)),
            MAX_SERVER_POLL_INTERVAL_MS
        );
        assert_eq!(initial_poll_interval(Some(u64::MAX)), MAX_SERVER_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_next_poll_interval_ratchet() {
        assert_eq!(next_poll_interval(5_000, 1), 5_000);
        assert_eq!(next_poll_interval(5_000, 19), 5_000);
        assert_eq!(next_poll_interval(5_000, 20), 6_000);
        assert_eq!(next_poll_interval(7_500, 25), 8_000);
        assert_eq!(next_poll_interval(8_000, 30), 8_000);
        // A slow_down bump above the ceiling is kept, not reduced
        assert_eq!(next_poll_interval(11_250, 40), 11_250);
    }

    #[test]
    fn test_slow_down_multiplies_without_cap() {
        assert_eq!(slow_down_interval(5_000), 7_500);
        assert_eq!(slow_down_interval(8_000), 12_000);
    }
}
