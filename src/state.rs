// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-tab state that is mirrored to sibling tabs.
//!
//! `auth` is authoritative: a received copy replaces the local one.
//! `fields` are LWW registers and are merged.

use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::sync::FieldReplica;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthTransition {
    Login,
    Logout,
    TokenRefresh,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub user: Option<UserProfile>,
    pub is_authenticated: bool,
}

impl AuthState {
    pub fn logged_in(user: UserProfile) -> Self {
        Self {
            user: Some(user),
            is_authenticated: true,
        }
    }

    pub fn logged_out() -> Self {
        Self::default()
    }

    pub fn role(&self) -> Option<Role> {
        self.user.as_ref().map(|user| user.role)
    }
}

/// Snapshot carried by a `STATE_UPDATE` broadcast.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedState {
    pub auth: AuthState,
    /// The auth transition that produced this snapshot, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<AuthTransition>,
    #[serde(default)]
    pub fields: FieldReplica,
}

#[cfg(test)]
pub(crate) fn bursar() -> UserProfile {
    UserProfile {
        id: "u-17".to_string(),
        name: "Meera Nair".to_string(),
        email: "meera@institute.example".to_string(),
        role: Role::Accountant,
    }
}
