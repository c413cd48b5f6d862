// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults and the loaded [`GuardConfig`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `FEEPORTAL_API_BASE_URL` | Remote API base URL | `http://localhost:5000/api/v1` |
//! | `FEEPORTAL_REFRESH_PATH` | Token refresh endpoint path | `/auth/refresh` |
//! | `FEEPORTAL_LOGIN_PATH` | Unauthenticated entry point | `/login` |
//! | `FEEPORTAL_CRYPTO_SECRET` | Long-term secret for at-rest encryption | Required |
//! | `FEEPORTAL_DATA_DIR` | Directory for the origin store | `./data` |
//! | `FEEPORTAL_SESSION_TIMEOUT_SECS` | Session idle timeout | `900` |
//! | `FEEPORTAL_SYNC_INTERVAL_SECS` | Periodic sync interval | `30` |
//! | `FEEPORTAL_MAX_RETRIES` | Retries before a queued action is dropped | `3` |
//! | `FEEPORTAL_HTTP_TIMEOUT_SECS` | HTTP client timeout | `15` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,feeportal_guard=debug` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::crypto::MasterSecret;
use crate::http::GatewaySettings;

pub const API_BASE_URL_ENV: &str = "FEEPORTAL_API_BASE_URL";
pub const REFRESH_PATH_ENV: &str = "FEEPORTAL_REFRESH_PATH";
pub const LOGIN_PATH_ENV: &str = "FEEPORTAL_LOGIN_PATH";

/// Secret the at-rest encryption keys are derived from.
///
/// There is no default: without it nothing can be persisted.
pub const CRYPTO_SECRET_ENV: &str = "FEEPORTAL_CRYPTO_SECRET";

pub const DATA_DIR_ENV: &str = "FEEPORTAL_DATA_DIR";
pub const SESSION_TIMEOUT_ENV: &str = "FEEPORTAL_SESSION_TIMEOUT_SECS";
pub const SYNC_INTERVAL_ENV: &str = "FEEPORTAL_SYNC_INTERVAL_SECS";
pub const MAX_RETRIES_ENV: &str = "FEEPORTAL_MAX_RETRIES";
pub const HTTP_TIMEOUT_ENV: &str = "FEEPORTAL_HTTP_TIMEOUT_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api/v1";
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";
pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 15 * 60;
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = crate::sync::queue::DEFAULT_MAX_RETRIES;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

/// Default `RUST_LOG` filter.
pub const DEFAULT_LOG_FILTER: &str = "info,feeportal_guard=debug";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub api_base_url: String,
    pub refresh_path: String,
    pub login_path: String,
    pub crypto_secret: MasterSecret,
    pub data_dir: PathBuf,
    pub session_timeout: Duration,
    pub sync_interval: Duration,
    pub max_retries: u32,
    pub http_timeout: Duration,
    pub log_format: LogFormat,
}

impl GuardConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let crypto_secret = get(CRYPTO_SECRET_ENV)
            .map(MasterSecret::new)
            .ok_or(ConfigError::Missing(CRYPTO_SECRET_ENV))?;

        let log_format = match get(LOG_FORMAT_ENV) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: LOG_FORMAT_ENV,
                value: raw,
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            api_base_url: get(API_BASE_URL_ENV).unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            refresh_path: get(REFRESH_PATH_ENV).unwrap_or_else(|| DEFAULT_REFRESH_PATH.to_string()),
            login_path: get(LOGIN_PATH_ENV).unwrap_or_else(|| DEFAULT_LOGIN_PATH.to_string()),
            crypto_secret,
            data_dir: get(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            session_timeout: Duration::from_secs(parse_or(
                &get,
                SESSION_TIMEOUT_ENV,
                DEFAULT_SESSION_TIMEOUT_SECS,
            )?),
            sync_interval: Duration::from_secs(parse_or(
                &get,
                SYNC_INTERVAL_ENV,
                DEFAULT_SYNC_INTERVAL_SECS,
            )?),
            max_retries: parse_or(&get, MAX_RETRIES_ENV, DEFAULT_MAX_RETRIES)?,
            http_timeout: Duration::from_secs(parse_or(
                &get,
                HTTP_TIMEOUT_ENV,
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?),
            log_format,
        })
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            base_url: self.api_base_url.clone(),
            refresh_path: self.refresh_path.clone(),
            login_path: self.login_path.clone(),
            timeout: self.http_timeout,
        }
    }
}

/// Parse a positive number, falling back to `default` when unset.
fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(name) else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(ConfigError::Invalid { name, value: raw }),
    }
}
