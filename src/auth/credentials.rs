// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Encrypted access/refresh token storage.
//!
//! Tokens live in origin storage under `access_token` and `refresh_token`,
//! each sealed as `v1$<salt>$<iv>$<ciphertext>`. Plaintext exists only for
//! the duration of a getter call.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::clock::Clock;
use crate::storage::{SecureStorage, StoreError};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Sealed payload for one token.
#[derive(Serialize, Deserialize)]
struct StoredToken {
    token: String,
    issued_at: DateTime<Utc>,
}

impl Drop for StoredToken {
    fn drop(&mut self) {
        self.token.zeroize();
    }
}

/// Plaintext credential pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub issued_at: DateTime<Utc>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        self.access_token.zeroize();
        self.refresh_token.zeroize();
    }
}

/// Owner of the persisted token pair.
pub struct CredentialStore {
    storage: SecureStorage,
    clock: Arc<dyn Clock>,
}

impl CredentialStore {
    pub fn new(storage: SecureStorage, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Seal and persist both tokens in one storage write.
    pub fn set_tokens(&self, access: &str, refresh: &str) -> Result<(), StoreError> {
        let issued_at = self.clock.now();
        let access = self.storage.seal(&StoredToken {
            token: access.to_string(),
            issued_at,
        })?;
        let refresh = self.storage.seal(&StoredToken {
            token: refresh.to_string(),
            issued_at,
        })?;

        self.storage.set_sealed_many(&[
            (ACCESS_TOKEN_KEY, access.as_str()),
            (REFRESH_TOKEN_KEY, refresh.as_str()),
        ])?;
        debug!(issued_at = %issued_at, "Stored credential pair");
        Ok(())
    }

    /// `None` when absent or unreadable.
    pub fn access_token(&self) -> Option<String> {
        self.load(ACCESS_TOKEN_KEY).map(|stored| stored.token.clone())
    }

    /// `None` when absent or unreadable.
    pub fn refresh_token(&self) -> Option<String> {
        self.load(REFRESH_TOKEN_KEY).map(|stored| stored.token.clone())
    }

    /// Both tokens, if both decrypt.
    pub fn credentials(&self) -> Option<Credentials> {
        let access = self.load(ACCESS_TOKEN_KEY)?;
        let refresh = self.load(REFRESH_TOKEN_KEY)?;
        Some(Credentials {
            access_token: access.token.clone(),
            refresh_token: refresh.token.clone(),
            issued_at: access.issued_at,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.access_token().is_some()
    }

    /// Remove both tokens together. Idempotent.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.storage
            .remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])?;
        debug!("Cleared credential pair");
        Ok(())
    }

    fn load(&self, key: &str) -> Option<StoredToken> {
        match self.storage.load_json::<StoredToken>(key) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(key = %key, error = %e, "Credential unreadable, treating session as logged out");
                None
            }
        }
    }
}
