// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # HTTP Layer
//!
//! - [`RequestGateway`] - authenticated client with single-shot token refresh
//! - [`CsrfManager`] - double-submit CSRF token and request headers

pub mod csrf;
pub mod gateway;

pub use csrf::CsrfManager;
pub use gateway::{
    ApiRequest, ApiResponse, AuthSignal, GatewayError, GatewaySettings, RequestGateway,
};
