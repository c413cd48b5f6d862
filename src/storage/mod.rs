// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Origin Storage
//!
//! Persistent key/value storage shared by every tab of one origin, the
//! counterpart of the browser's local storage.
//!
//! ## Layers
//!
//! - [`KeyValueStore`] - raw string entries. [`MemoryStore`] for tests and
//!   multi-tab simulation, [`RedbStore`] for an embedded ACID file.
//! - [`SecureStorage`] - JSON values sealed with the
//!   [`CredentialCipher`](crate::crypto::CredentialCipher) before they reach
//!   the raw store.
//!
//! ## Concurrency
//!
//! There is no cross-tab lock. Concurrent writers to the same key race and the
//! last write wins; fields that several tabs edit are reconciled one level up
//! with [`LwwRegister`](crate::sync::LwwRegister).

pub mod kv;
pub mod redb_store;
pub mod secure;

pub use kv::{KeyValueStore, MemoryStore, StorageError, StorageResult};
pub use redb_store::RedbStore;
pub use secure::{SecureStorage, StoreError};
