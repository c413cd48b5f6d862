// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Double-submit CSRF token.
//!
//! The token lives in a `SameSite=Strict` cookie and is echoed in the
//! `X-CSRF-Token` header of every request.

use std::sync::RwLock;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use tracing::debug;
use uuid::Uuid;

pub const CSRF_COOKIE_NAME: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";
pub const REQUESTED_WITH_HEADER: &str = "x-requested-with";
pub const REQUESTED_WITH_VALUE: &str = "XMLHttpRequest";

#[derive(Debug, Default)]
pub struct CsrfManager {
    token: RwLock<Option<String>>,
}

impl CsrfManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore the token from a `Cookie:` header value.
    pub fn from_cookie_header(header: &str) -> Self {
        let token = header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == CSRF_COOKIE_NAME)
            .map(|(_, value)| value.to_string())
            .filter(|value| !value.is_empty());
        Self {
            token: RwLock::new(token),
        }
    }

    /// Current token, generated on first use.
    pub fn token(&self) -> String {
        if let Some(token) = self
            .token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
        {
            return token;
        }

        let mut slot = self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.get_or_insert_with(|| {
            debug!("Generated CSRF token");
            Uuid::new_v4().to_string()
        })
        .clone()
    }

    /// Replace the token with a fresh one.
    pub fn generate(&self) -> String {
        let token = Uuid::new_v4().to_string();
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.clone());
        token
    }

    /// `Set-Cookie` line for the token.
    pub fn cookie_line(&self) -> String {
        format!(
            "{CSRF_COOKIE_NAME}={}; Path=/; SameSite=Strict; Secure",
            self.token()
        )
    }

    /// Compare a submitted token against the cookie.
    pub fn validate(&self, submitted: &str) -> bool {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_deref()
            .is_some_and(|token| !submitted.is_empty() && token == submitted)
    }

    /// Headers attached to every outgoing request.
    pub fn headers(&self) -> HeaderMap {
        let token = self.token();
        let mut headers = HeaderMap::new();
        // UUID text is always a valid header value
        if let Ok(value) = HeaderValue::from_str(&token) {
            headers.insert(HeaderName::from_static(CSRF_HEADER), value);
        }
        if let Ok(cookie) = HeaderValue::from_str(&format!("{CSRF_COOKIE_NAME}={token}")) {
            headers.insert(COOKIE, cookie);
        }
        headers.insert(
            HeaderName::from_static(REQUESTED_WITH_HEADER),
            HeaderValue::from_static(REQUESTED_WITH_VALUE),
        );
        headers
    }
}
