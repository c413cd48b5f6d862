// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Guard
//!
//! Tracks one tab's session and decides whether it is still valid.
//!
//! ## Lifecycle
//!
//! ```text
//! New --init_session()--> Active --idle / fingerprint mismatch / end--> Expired
//!  ^                                                                      |
//!  +-------------------------- init_session() ---------------------------+
//! ```
//!
//! A session is valid iff `now - last_activity_at < idle_timeout` and the
//! environment fingerprint still matches the one captured at init. The idle
//! budget is measured from the last *validated* activity.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::fingerprint::{Environment, Fingerprint};
use crate::clock::Clock;

/// Default idle timeout (15 minutes).
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    New,
    Active,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub device_fingerprint: Fingerprint,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// Why a session is not usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("no session has been started")]
    NotStarted,

    #[error("session idle timeout exceeded")]
    Idle,

    #[error("session environment changed")]
    Tamper,

    #[error("session ended")]
    Ended,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    session: Option<Session>,
    expired_by: Option<SessionError>,
}

pub struct SessionGuard {
    inner: Mutex<Inner>,
    environment: Arc<Environment>,
    clock: Arc<dyn Clock>,
    idle_timeout: Duration,
}

impl SessionGuard {
    pub fn new(environment: Arc<Environment>, clock: Arc<dyn Clock>, idle_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::New,
                session: None,
                expired_by: None,
            }),
            environment,
            clock,
            idle_timeout,
        }
    }

    /// Start a fresh session, replacing any previous one.
    pub fn init_session(&self) -> Session {
        let now = self.clock.now();
        let session = Session {
            session_id: Uuid::new_v4(),
            device_fingerprint: self.environment.fingerprint(),
            started_at: now,
            last_activity_at: now,
        };

        let mut inner = self.lock();
        inner.state = SessionState::Active;
        inner.session = Some(session.clone());
        inner.expired_by = None;

        info!(session_id = %session.session_id, "Session started");
        session
    }

    /// Check the session and record activity.
    ///
    /// On failure an active session transitions to `Expired`.
    pub fn validate(&self) -> Result<(), SessionError> {
        let now = self.clock.now();
        let current = self.environment.fingerprint();
        let mut inner = self.lock();

        if inner.state == SessionState::Expired {
            return Err(inner.expired_by.unwrap_or(SessionError::Ended));
        }
        let Some(session) = inner.session.as_mut() else {
            return Err(SessionError::NotStarted);
        };

        match self.check(session, &current, now) {
            Ok(()) => {
                // Monotonic even if the wall clock stepped back
                if now > session.last_activity_at {
                    session.last_activity_at = now;
                }
                Ok(())
            }
            Err(reason) => {
                match reason {
                    SessionError::Tamper => {
                        warn!(session_id = %session.session_id, "Session fingerprint mismatch, expiring")
                    }
                    _ => info!(session_id = %session.session_id, "Session idle timeout, expiring"),
                }
                inner.state = SessionState::Expired;
                inner.expired_by = Some(reason);
                Err(reason)
            }
        }
    }

    /// `validate()` as a boolean.
    pub fn validate_session(&self) -> bool {
        self.validate().is_ok()
    }

    /// Same check as `validate_session()` without touching the session.
    pub fn is_session_expired(&self) -> bool {
        self.expiry_reason().is_some()
    }

    /// Side-effect-free check returning the reason the session is unusable.
    pub fn expiry_reason(&self) -> Option<SessionError> {
        let now = self.clock.now();
        let current = self.environment.fingerprint();
        let inner = self.lock();

        if inner.state == SessionState::Expired {
            return Some(inner.expired_by.unwrap_or(SessionError::Ended));
        }
        match inner.session.as_ref() {
            Some(session) => self.check(session, &current, now).err(),
            None => Some(SessionError::NotStarted),
        }
    }

    /// Force the session into `Expired` (logout).
    pub fn end_session(&self) {
        let mut inner = self.lock();
        if inner.state != SessionState::Expired {
            if let Some(session) = &inner.session {
                info!(session_id = %session.session_id, "Session ended");
            }
            inner.state = SessionState::Expired;
            inner.expired_by = Some(SessionError::Ended);
        }
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn session(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    fn check(&self, session: &Session, current: &Fingerprint, now: DateTime<Utc>) -> Result<(), SessionError> {
        if &session.device_fingerprint != current {
            return Err(SessionError::Tamper);
        }
        let idle = (now - session.last_activity_at).to_std().unwrap_or_default();
        if idle >= self.idle_timeout {
            return Err(SessionError::Idle);
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::fingerprint::desktop_attributes;
    use crate::clock::ManualClock;

    const MINUTE: Duration = Duration::from_secs(60);

    fn guard() -> (SessionGuard, Arc<ManualClock>, Arc<Environment>) {
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let env = Arc::new(Environment::new(desktop_attributes()));
        let guard = SessionGuard::new(env.clone(), clock.clone(), DEFAULT_IDLE_TIMEOUT);
        (guard, clock, env)
    }

    #[test]
    fn starts_new_and_invalid() {
        let (guard, _, _) = guard();
        assert_eq!(guard.state(), SessionState::New);
        assert!(guard.is_session_expired());
        assert!(!guard.validate_session());
        assert_eq!(guard.state(), SessionState::New);
    }

    #[test]
    fn idle_for_sixteen_minutes_expires() {
        let (guard, clock, _) = guard();
        guard.init_session();

        clock.advance(16 * MINUTE);
        assert!(!guard.validate_session());
        assert_eq!(guard.state(), SessionState::Expired);
        assert_eq!(guard.validate(), Err(SessionError::Idle));
    }

    #[test]
    fn activity_at_fourteen_minutes_keeps_session_through_sixteen() {
        let (guard, clock, _) = guard();
        guard.init_session();

        clock.advance(14 * MINUTE);
        assert!(guard.validate_session());

        clock.advance(2 * MINUTE);
        assert!(!guard.is_session_expired());
        assert!(guard.validate_session());
        assert_eq!(guard.state(), SessionState::Active);
    }

    #[test]
    fn pure_check_does_not_extend_session() {
        let (guard, clock, _) = guard();
        guard.init_session();

        clock.advance(14 * MINUTE);
        assert!(!guard.is_session_expired());
        clock.advance(2 * MINUTE);
        assert!(guard.is_session_expired());
        assert_eq!(guard.state(), SessionState::Active);
    }

    #[test]
    fn fingerprint_mismatch_expires_as_tamper() {
        let (guard, _, env) = guard();
        guard.init_session();

        let mut other = desktop_attributes();
        other.user_agent = "curl/8.0".to_string();
        env.replace(other);

        assert_eq!(guard.expiry_reason(), Some(SessionError::Tamper));
        assert_eq!(guard.validate(), Err(SessionError::Tamper));
        assert_eq!(guard.state(), SessionState::Expired);

        // Restoring the environment does not revive an expired session
        env.replace(desktop_attributes());
        assert!(!guard.validate_session());
    }

    #[test]
    fn last_activity_never_moves_backwards() {
        let (guard, clock, _) = guard();
        let started = guard.init_session();

        clock.set_millis(1_700_000_000_000 - 60_000);
        assert!(guard.validate_session());
        assert_eq!(guard.session().unwrap().last_activity_at, started.last_activity_at);
    }

    #[test]
    fn reinit_recovers_from_expired() {
        let (guard, _, _) = guard();
        let first = guard.init_session();
        guard.end_session();
        assert_eq!(guard.state(), SessionState::Expired);
        assert_eq!(guard.validate(), Err(SessionError::Ended));

        let second = guard.init_session();
        assert_ne!(first.session_id, second.session_id);
        assert!(guard.validate_session());
    }
}
