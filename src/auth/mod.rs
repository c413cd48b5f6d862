// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Client-side credential and session handling for the fee portal.
//!
//! ## Pieces
//!
//! - [`CredentialStore`] - encrypted access/refresh token pair in origin storage
//! - [`SessionGuard`] - idle timeout and environment fingerprint binding
//! - [`Environment`] - live environment attributes and their fingerprint
//! - [`Role`] / [`PermissionTable`] - advisory UI permissions
//!
//! ## Security
//!
//! - Tokens are never written to storage in plaintext
//! - A session expires after 15 minutes without validated activity
//! - A fingerprint mismatch is treated as possible session theft
//! - The server remains the authority for every authorization decision

pub mod credentials;
pub mod fingerprint;
pub mod permissions;
pub mod roles;
pub mod session;

pub use credentials::{CredentialStore, Credentials, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
pub use fingerprint::{Environment, EnvironmentAttributes, Fingerprint};
pub use permissions::PermissionTable;
pub use roles::{Role, UnknownRole};
pub use session::{Session, SessionError, SessionGuard, SessionState, DEFAULT_IDLE_TIMEOUT};
