// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Error Taxonomy
//!
//! User-facing errors of a tab. Module errors convert into [`GuardError`];
//! the UI shows [`GuardError::user_message`] and keys behavior off
//! [`GuardError::error_code`].
//!
//! | Variant | Effect |
//! |---------|--------|
//! | `Decrypt` | Treated as logged out, never shown |
//! | `AuthExpired` | Forced logout and redirect |
//! | `RefreshFailed` | Forced logout and redirect |
//! | `QueueTerminalFailure` | Dismissible notice, action removed |
//! | `SessionTamper` | Forced logout, shown exactly like expiry |

use crate::config::ConfigError;
use crate::crypto::CipherError;
use crate::http::GatewayError;
use crate::storage::{StorageError, StoreError};
use crate::sync::{QueueError, SchedulerError, TerminalFailure};

const SESSION_ENDED_MESSAGE: &str = "Your session has expired. Please sign in again.";

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("stored credential could not be decrypted")]
    Decrypt,

    #[error("authentication expired")]
    AuthExpired,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("action {} on {} dropped after {} retries: {}", .0.action.id, .0.action.endpoint, .0.action.retry_count, .0.error)]
    QueueTerminalFailure(Box<TerminalFailure>),

    #[error("session environment changed")]
    SessionTamper,

    #[error("not signed in")]
    NotAuthenticated,

    #[error("request failed: {0}")]
    Request(GatewayError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl GuardError {
    pub fn error_code(&self) -> &'static str {
        match self {
            GuardError::Decrypt => "decrypt_error",
            GuardError::AuthExpired => "auth_expired",
            GuardError::RefreshFailed(_) => "refresh_failed",
            GuardError::QueueTerminalFailure(_) => "queue_terminal_failure",
            GuardError::SessionTamper => "session_tamper",
            GuardError::NotAuthenticated => "not_authenticated",
            GuardError::Request(_) => "request_failed",
            GuardError::Storage(_) => "storage_error",
            GuardError::Config(_) => "config_error",
            GuardError::Scheduler(_) => "scheduler_stopped",
        }
    }

    /// Text safe to show the user. Tamper is indistinguishable from expiry.
    pub fn user_message(&self) -> String {
        match self {
            GuardError::AuthExpired
            | GuardError::RefreshFailed(_)
            | GuardError::SessionTamper
            | GuardError::Decrypt
            | GuardError::NotAuthenticated => SESSION_ENDED_MESSAGE.to_string(),
            GuardError::QueueTerminalFailure(failure) => format!(
                "A change to {} could not be synced and was discarded.",
                failure.action.endpoint
            ),
            GuardError::Request(GatewayError::Status { status, .. }) => {
                format!("The server rejected the request ({status}).")
            }
            GuardError::Request(e) if e.is_transient() => {
                "The server could not be reached. Your change will be retried.".to_string()
            }
            GuardError::Request(_)
            | GuardError::Storage(_)
            | GuardError::Config(_)
            | GuardError::Scheduler(_) => "Something went wrong. Please try again.".to_string(),
        }
    }

    /// Whether the tab must log out and redirect.
    pub fn forces_logout(&self) -> bool {
        matches!(
            self,
            GuardError::AuthExpired | GuardError::RefreshFailed(_) | GuardError::SessionTamper
        )
    }
}

impl From<GatewayError> for GuardError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::AuthExpired | GatewayError::SessionExpired => GuardError::AuthExpired,
            GatewayError::SessionTamper => GuardError::SessionTamper,
            GatewayError::RefreshFailed(reason) => GuardError::RefreshFailed(reason),
            GatewayError::NoSession => GuardError::NotAuthenticated,
            GatewayError::Store(e) => e.into(),
            other => GuardError::Request(other),
        }
    }
}

impl From<StoreError> for GuardError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Cipher(_) => GuardError::Decrypt,
            other => GuardError::Storage(other.to_string()),
        }
    }
}

impl From<StorageError> for GuardError {
    fn from(e: StorageError) -> Self {
        GuardError::Storage(e.to_string())
    }
}

impl From<CipherError> for GuardError {
    fn from(_: CipherError) -> Self {
        GuardError::Decrypt
    }
}

impl From<QueueError> for GuardError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Store(e) => e.into(),
        }
    }
}

impl From<TerminalFailure> for GuardError {
    fn from(failure: TerminalFailure) -> Self {
        GuardError::QueueTerminalFailure(Box::new(failure))
    }
}

pub type GuardResult<T> = Result<T, GuardError>;
