// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Encrypted JSON values over a raw [`KeyValueStore`].

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;
use zeroize::Zeroizing;

use super::kv::{KeyValueStore, StorageError};
use crate::crypto::{CipherError, CredentialCipher};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Seals every value before it reaches storage.
#[derive(Clone)]
pub struct SecureStorage {
    kv: Arc<dyn KeyValueStore>,
    cipher: Arc<CredentialCipher>,
}

impl SecureStorage {
    pub fn new(kv: Arc<dyn KeyValueStore>, cipher: Arc<CredentialCipher>) -> Self {
        Self { kv, cipher }
    }

    /// Serialize and encrypt a value into its stored form.
    pub fn seal<T: Serialize>(&self, value: &T) -> Result<String, StoreError> {
        let json = Zeroizing::new(serde_json::to_vec(value)?);
        Ok(self.cipher.seal_to_string(&json)?)
    }

    /// Decrypt and deserialize a stored value.
    pub fn unseal<T: DeserializeOwned>(&self, raw: &str) -> Result<T, StoreError> {
        let json = Zeroizing::new(self.cipher.open_str(raw)?);
        Ok(serde_json::from_slice(&json)?)
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let sealed = self.seal(value)?;
        self.kv.set(key, &sealed)?;
        Ok(())
    }

    /// Write several already-sealed values in one storage operation.
    pub fn set_sealed_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        self.kv.set_many(entries)?;
        Ok(())
    }

    /// Load a value, distinguishing absence from failure.
    pub fn load_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.kv.get(key)? {
            Some(raw) => self.unseal(&raw).map(Some),
            None => Ok(None),
        }
    }

    /// Load a value; any failure reads as absent.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.load_json(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Stored value unreadable, treating as absent");
                None
            }
        }
    }

    pub fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        self.kv.remove_many(keys)?;
        Ok(())
    }

    /// Write sealed values and remove keys in one storage operation.
    pub fn apply_sealed(&self, set: &[(&str, &str)], remove: &[&str]) -> Result<(), StoreError> {
        self.kv.apply(set, remove)?;
        Ok(())
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.kv.keys_with_prefix(prefix)?)
    }
}
