// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Portal roles.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Portal user roles.
///
/// ## Role Hierarchy
///
/// - `Admin` (3) - institute administration, every section
/// - `Accountant` (2) - fee collection and transactions
/// - `Student` (1) - own fees, receipts and profile
///
/// Client-side checks are advisory; the API enforces authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Accountant,
    Student,
}

impl Role {
    /// Position in the hierarchy, higher is more privileged.
    pub fn level(self) -> u8 {
        match self {
            Role::Admin => 3,
            Role::Accountant => 2,
            Role::Student => 1,
        }
    }

    /// Check if this role has at least the privileges of the required role.
    pub fn has_privilege(self, required: Role) -> bool {
        self.level() >= required.level()
    }

    /// Most privileged role of a user holding several.
    pub fn highest(roles: &[Role]) -> Option<Role> {
        roles.iter().copied().max_by_key(|role| role.level())
    }
}

impl Default for Role {
    /// Least privilege.
    fn default() -> Self {
        Role::Student
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "accountant" => Ok(Role::Accountant),
            "student" => Ok(Role::Student),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Accountant => write!(f, "accountant"),
            Role::Student => write!(f, "student"),
        }
    }
}
