// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Environment fingerprinting.
//!
//! A SHA-256 digest over stable environment attributes. It is a heuristic
//! tamper signal for session reuse in a different environment, not a
//! cryptographic boundary: every input is observable and forgeable.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Attributes the fingerprint is computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentAttributes {
    pub user_agent: String,
    pub locale: String,
    /// Minutes east of UTC.
    pub timezone_offset_minutes: i32,
    pub screen_width: u32,
    pub screen_height: u32,
}

impl EnvironmentAttributes {
    /// Attributes of the running process, for headless use.
    pub fn from_process() -> Self {
        let locale = std::env::var("LC_ALL")
            .or_else(|_| std::env::var("LANG"))
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "en-US".to_string());
        let offset_seconds = chrono::Local::now().offset().local_minus_utc();

        Self {
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            locale,
            timezone_offset_minutes: offset_seconds / 60,
            screen_width: 0,
            screen_height: 0,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let fields = [
            self.user_agent.clone(),
            self.locale.clone(),
            self.timezone_offset_minutes.to_string(),
            self.screen_width.to_string(),
            self.screen_height.to_string(),
        ];

        let mut hasher = Sha256::new();
        // Unit separator keeps adjacent fields from running together
        for field in &fields {
            hasher.update(field.as_bytes());
            hasher.update(b"\x1f");
        }
        Fingerprint(format!("{:x}", hasher.finalize()))
    }
}

/// Hex-encoded environment digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight hex characters.
    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The live environment as seen by one tab.
///
/// The embedding shell replaces the attributes when it observes a change
/// (window moved to another display, locale switched).
#[derive(Debug)]
pub struct Environment {
    attributes: RwLock<EnvironmentAttributes>,
}

impl Environment {
    pub fn new(attributes: EnvironmentAttributes) -> Self {
        Self {
            attributes: RwLock::new(attributes),
        }
    }

    pub fn current(&self) -> EnvironmentAttributes {
        self.attributes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn replace(&self, attributes: EnvironmentAttributes) {
        *self
            .attributes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = attributes;
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.current().fingerprint()
    }
}

#[cfg(test)]
pub(crate) fn desktop_attributes() -> EnvironmentAttributes {
    EnvironmentAttributes {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0".to_string(),
        locale: "en-IN".to_string(),
        timezone_offset_minutes: 330,
        screen_width: 1920,
        screen_height: 1080,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable() {
        let attrs = desktop_attributes();
        assert_eq!(attrs.fingerprint(), attrs.clone().fingerprint());
        assert_eq!(attrs.fingerprint().as_str().len(), 64);
        assert_eq!(attrs.fingerprint().short().len(), 8);
    }

    #[test]
    fn any_attribute_changes_fingerprint() {
        let base = desktop_attributes();
        let mut changed = base.clone();
        changed.screen_width = 1280;
        assert_ne!(base.fingerprint(), changed.fingerprint());

        let mut changed = base.clone();
        changed.timezone_offset_minutes = 0;
        assert_ne!(base.fingerprint(), changed.fingerprint());
    }

    #[test]
    fn fields_do_not_run_together() {
        let mut a = desktop_attributes();
        a.user_agent = "ab".to_string();
        a.locale = "c".to_string();
        let mut b = desktop_attributes();
        b.user_agent = "a".to_string();
        b.locale = "bc".to_string();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn environment_replace_changes_fingerprint() {
        let env = Environment::new(desktop_attributes());
        let before = env.fingerprint();
        let mut moved = desktop_attributes();
        moved.locale = "de-DE".to_string();
        env.replace(moved);
        assert_ne!(before, env.fingerprint());
    }
}
