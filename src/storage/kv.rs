// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Raw key/value storage seam.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Error type for raw storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage lock poisoned")]
    Poisoned,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Origin-scoped string storage.
///
/// `apply` writes and removes in one all-or-nothing step so related entries
/// never diverge.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    fn apply(&self, set: &[(&str, &str)], remove: &[&str]) -> StorageResult<()>;

    /// Keys starting with `prefix`, in ascending order.
    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;

    fn set_many(&self, entries: &[(&str, &str)]) -> StorageResult<()> {
        self.apply(entries, &[])
    }

    fn remove_many(&self, keys: &[&str]) -> StorageResult<()> {
        self.apply(&[], keys)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.set_many(&[(key, value)])
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.remove_many(&[key])
    }
}

/// In-process store. Clones share the same entries, like tabs sharing one
/// origin's local storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, HashMap<String, String>>> {
        self.entries.lock().map_err(|_| StorageError::Poisoned)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn apply(&self, set: &[(&str, &str)], remove: &[&str]) -> StorageResult<()> {
        let mut map = self.lock()?;
        for (key, value) in set {
            map.insert((*key).to_string(), (*value).to_string());
        }
        for key in remove {
            map.remove(*key);
        }
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .lock()?
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_entries() {
        let tab_a = MemoryStore::new();
        let tab_b = tab_a.clone();

        tab_a.set("access_token", "v1$x").unwrap();
        assert_eq!(tab_b.get("access_token").unwrap().as_deref(), Some("v1$x"));

        tab_b.remove("access_token").unwrap();
        assert!(tab_a.get("access_token").unwrap().is_none());
    }

    #[test]
    fn remove_many_is_idempotent() {
        let store = MemoryStore::new();
        store.set_many(&[("a", "1"), ("b", "2"), ("c", "3")]).unwrap();

        store.remove_many(&["a", "b"]).unwrap();
        store.remove_many(&["a", "b"]).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("c").unwrap().as_deref(), Some("3"));
    }

    #[test]
    fn apply_writes_and_removes_together() {
        let store = MemoryStore::new();
        store.set_many(&[("offline_queue:a", "1"), ("offline_queue:b", "2"), ("access_token", "t")]).unwrap();

        store.apply(&[("offline_queue:c", "3")], &["offline_queue:a", "offline_queue:b"]).unwrap();

        assert_eq!(store.keys_with_prefix("offline_queue:").unwrap(), vec!["offline_queue:c"]);
        assert_eq!(store.get("access_token").unwrap().as_deref(), Some("t"));
    }
}
