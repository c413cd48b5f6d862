// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! FeePortal Guard - client-side security and offline sync layer
//!
//! Protects credentials at rest, guards the session against idle timeout and
//! environment tampering, refreshes tokens transparently, and replays
//! mutations made while offline.
//!
//! ## Modules
//!
//! - `auth` - Credentials, sessions, fingerprints and permissions
//! - `crypto` - AES-256-GCM credential cipher
//! - `storage` - Key/value stores and the sealing layer over them
//! - `http` - Request gateway with CSRF headers and token refresh
//! - `sync` - Offline action queue, scheduler, LWW registers, cross-tab bus
//! - `context` - Origin and per-tab wiring of the above

pub mod auth;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod context;
pub mod crypto;
pub mod error;
pub mod http;
pub mod logging;
pub mod state;
pub mod storage;
pub mod sync;
