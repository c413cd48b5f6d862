// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Request Gateway
//!
//! HTTP client wrapper that attaches credentials and CSRF headers to every
//! request and recovers from an expired access token.
//!
//! ## 401 Handling
//!
//! 1. A request that has not been retried receives a 401
//! 2. The gateway takes the refresh latch; if another request already
//!    rotated the access token while this one waited, it skips to step 4
//! 3. `POST {refreshToken}` to the refresh endpoint and persist the new pair
//! 4. Replay the original request once, marked as retried
//!
//! A retried request that receives 401 again fails with the status. A failed
//! refresh clears credentials, ends the session and emits
//! [`AuthSignal::LoggedOut`] carrying the login path.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use url::Url;

use super::csrf::CsrfManager;
use crate::auth::{CredentialStore, SessionError, SessionGuard};
use crate::storage::StoreError;
use crate::sync::queue::{ActionDispatcher, ActionKind, DispatchError, QueuedAction};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no active session")]
    NoSession,

    #[error("session expired")]
    SessionExpired,

    #[error("session environment changed")]
    SessionTamper,

    #[error("authentication expired and no refresh token is available")]
    AuthExpired,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("request failed with status {status}")]
    Status { status: u16, body: Value },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("credential storage error: {0}")]
    Store(#[from] StoreError),
}

impl GatewayError {
    /// Worth retrying later without user involvement.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Transport(_) => true,
            GatewayError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }

    /// The tab is no longer authenticated after this error.
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            GatewayError::NoSession
                | GatewayError::SessionExpired
                | GatewayError::SessionTamper
                | GatewayError::AuthExpired
                | GatewayError::RefreshFailed(_)
        )
    }
}

/// Auth transitions observed by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSignal {
    Refreshed,
    LoggedOut { redirect_to: String },
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub base_url: String,
    pub refresh_path: String,
    pub login_path: String,
    pub timeout: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_url: crate::config::DEFAULT_API_BASE_URL.to_string(),
            refresh_path: crate::config::DEFAULT_REFRESH_PATH.to_string(),
            login_path: crate::config::DEFAULT_LOGIN_PATH.to_string(),
            timeout: Duration::from_secs(crate::config::DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

/// One logical request. `retried` is the one-shot replay flag.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    /// The request replaying a mutation of the given kind.
    pub fn mutation(kind: ActionKind, path: impl Into<String>, payload: Value) -> Self {
        let method = match kind {
            ActionKind::Create => Method::POST,
            ActionKind::Update => Method::PUT,
            ActionKind::Delete => Method::DELETE,
        };
        let request = Self::new(method, path);
        if payload.is_null() {
            request
        } else {
            request.with_body(payload)
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
}

pub struct RequestGateway {
    http: Client,
    settings: GatewaySettings,
    credentials: Arc<CredentialStore>,
    session: Arc<SessionGuard>,
    csrf: Arc<CsrfManager>,
    refresh_latch: Mutex<()>,
    signals: broadcast::Sender<AuthSignal>,
}

impl RequestGateway {
    pub fn new(
        settings: GatewaySettings,
        credentials: Arc<CredentialStore>,
        session: Arc<SessionGuard>,
        csrf: Arc<CsrfManager>,
    ) -> Result<Self, GatewayError> {
        Url::parse(&settings.base_url)
            .map_err(|e| GatewayError::InvalidUrl(format!("{}: {e}", settings.base_url)))?;

        let http = Client::builder().timeout(settings.timeout).build()?;
        let (signals, _) = broadcast::channel(16);

        Ok(Self {
            http,
            settings,
            credentials,
            session,
            csrf,
            refresh_latch: Mutex::new(()),
            signals,
        })
    }

    /// Receive refresh and forced-logout notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthSignal> {
        self.signals.subscribe()
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn session(&self) -> &Arc<SessionGuard> {
        &self.session
    }

    pub fn csrf(&self) -> &Arc<CsrfManager> {
        &self.csrf
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Send a request, refreshing the access token at most once.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, GatewayError> {
        self.ensure_session()?;

        let stale = self.credentials.access_token();
        let response = self.execute(&request, stale.as_deref()).await?;

        if response.status != StatusCode::UNAUTHORIZED.as_u16() || request.retried {
            return into_result(response);
        }

        debug!(method = %request.method, path = %request.path, "Access token rejected, refreshing");
        self.refresh_after(stale.as_deref()).await?;

        let retry = ApiRequest {
            retried: true,
            ..request
        };
        let token = self.credentials.access_token();
        let response = self.execute(&retry, token.as_deref()).await?;
        into_result(response)
    }

    /// Clear credentials, end the session and announce the redirect.
    pub fn force_logout(&self, reason: &str) {
        if let Err(e) = self.credentials.clear() {
            warn!(error = %e, "Failed to clear credentials during logout");
        }
        self.session.end_session();
        info!(reason = %reason, redirect_to = %self.settings.login_path, "Forced logout");
        let _ = self.signals.send(AuthSignal::LoggedOut {
            redirect_to: self.settings.login_path.clone(),
        });
    }

    fn ensure_session(&self) -> Result<(), GatewayError> {
        match self.session.validate() {
            Ok(()) => Ok(()),
            Err(SessionError::NotStarted) => Err(GatewayError::NoSession),
            Err(SessionError::Ended) => Err(GatewayError::SessionExpired),
            Err(SessionError::Idle) => {
                self.force_logout("idle timeout");
                Err(GatewayError::SessionExpired)
            }
            Err(SessionError::Tamper) => {
                self.force_logout("fingerprint mismatch");
                Err(GatewayError::SessionTamper)
            }
        }
    }

    async fn refresh_after(&self, stale: Option<&str>) -> Result<(), GatewayError> {
        let _latch = self.refresh_latch.lock().await;

        let current = self.credentials.access_token();
        if current.is_some() && current.as_deref() != stale {
            debug!("Access token already rotated by a concurrent request");
            return Ok(());
        }

        let Some(refresh_token) = self.credentials.refresh_token() else {
            self.force_logout("no refresh token");
            return Err(GatewayError::AuthExpired);
        };

        match self.post_refresh(&refresh_token).await {
            Ok(tokens) => {
                self.credentials
                    .set_tokens(&tokens.access_token, &tokens.refresh_token)?;
                info!("Access token refreshed");
                let _ = self.signals.send(AuthSignal::Refreshed);
                Ok(())
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Refresh endpoint unreachable, keeping credentials");
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                self.force_logout("refresh failed");
                Err(GatewayError::RefreshFailed(e.to_string()))
            }
        }
    }

    async fn post_refresh(&self, refresh_token: &str) -> Result<RefreshResponse, GatewayError> {
        let url = self.url(&self.settings.refresh_path)?;
        let response = self
            .http
            .post(url)
            .headers(self.csrf.headers())
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: Value::Null,
            });
        }
        Ok(response.json::<RefreshResponse>().await?)
    }

    async fn execute(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<ApiResponse, GatewayError> {
        let url = self.url(&request.path)?;
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .headers(self.csrf.headers());
        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        debug!(method = %request.method, path = %request.path, status, retried = request.retried, "Request completed");
        Ok(ApiResponse { status, body })
    }

    fn url(&self, path: &str) -> Result<Url, GatewayError> {
        let raw = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!(
                "{}/{}",
                self.settings.base_url.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        };
        Url::parse(&raw).map_err(|e| GatewayError::InvalidUrl(format!("{raw}: {e}")))
    }
}

fn into_result(response: ApiResponse) -> Result<ApiResponse, GatewayError> {
    if (200..300).contains(&response.status) {
        Ok(response)
    } else {
        Err(GatewayError::Status {
            status: response.status,
            body: response.body,
        })
    }
}

impl ActionDispatcher for RequestGateway {
    async fn dispatch(&self, action: &QueuedAction) -> Result<(), DispatchError> {
        let request =
            ApiRequest::mutation(action.kind, action.endpoint.clone(), action.payload.clone());

        self.send(request).await.map(|_| ()).map_err(|e| DispatchError {
            halt: e.ends_session(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{
        extract::State,
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::{get, post},
        Json, Router,
    };

    use serde_json::json;

    use super::*;
    use crate::auth::fingerprint::desktop_attributes;
    use crate::auth::{Environment, DEFAULT_IDLE_TIMEOUT};
    use crate::clock::ManualClock;
    use crate::crypto::{CredentialCipher, MasterSecret};
    use crate::storage::{MemoryStore, SecureStorage};

    #[derive(Clone)]
    struct MockApi {
        refreshes: Arc<AtomicUsize>,
        hits: Arc<AtomicUsize>,
        valid_access: Arc<std::sync::Mutex<String>>,
        valid_refresh: Arc<std::sync::Mutex<String>>,
        refresh_delay: Duration,
    }

    impl MockApi {
        fn new() -> Self {
            Self {
                refreshes: Arc::new(AtomicUsize::new(0)),
                hits: Arc::new(AtomicUsize::new(0)),
                valid_access: Arc::new(std::sync::Mutex::new("access-2".to_string())),
                valid_refresh: Arc::new(std::sync::Mutex::new("refresh-1".to_string())),
                refresh_delay: Duration::ZERO,
            }
        }

        fn authorized(&self, headers: &HeaderMap) -> bool {
            let expected = format!("Bearer {}", self.valid_access.lock().unwrap());
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == expected)
        }
    }

    async fn refresh(State(api): State<MockApi>, Json(body): Json<Value>) -> (AxumStatus, Json<Value>) {
        api.refreshes.fetch_add(1, Ordering::SeqCst);
        if !api.refresh_delay.is_zero() {
            tokio::time::sleep(api.refresh_delay).await;
        }

        let presented = body.get("refreshToken").and_then(Value::as_str).unwrap_or_default();
        let mut valid_refresh = api.valid_refresh.lock().unwrap();
        if presented.is_empty() || presented != *valid_refresh {
            return (AxumStatus::UNAUTHORIZED, Json(json!({ "error": "invalid refresh token" })));
        }

        // Refresh tokens rotate on use
        *valid_refresh = "refresh-2".to_string();
        *api.valid_access.lock().unwrap() = "access-3".to_string();
        (
            AxumStatus::OK,
            Json(json!({ "accessToken": "access-3", "refreshToken": "refresh-2" })),
        )
    }

    async fn fees(State(api): State<MockApi>, headers: HeaderMap) -> (AxumStatus, Json<Value>) {
        api.hits.fetch_add(1, Ordering::SeqCst);

        let csrf_header = headers.get("x-csrf-token").and_then(|v| v.to_str().ok());
        let csrf_cookie = headers.get("cookie").and_then(|v| v.to_str().ok());
        let requested_with = headers.get("x-requested-with").and_then(|v| v.to_str().ok());
        let csrf_ok = match (csrf_header, csrf_cookie) {
            (Some(token), Some(cookie)) => cookie == format!("csrf_token={token}"),
            _ => false,
        };
        if !csrf_ok || requested_with != Some("XMLHttpRequest") {
            return (AxumStatus::FORBIDDEN, Json(json!({ "error": "csrf" })));
        }

        if !api.authorized(&headers) {
            return (AxumStatus::UNAUTHORIZED, Json(json!({ "error": "expired" })));
        }
        (AxumStatus::OK, Json(json!({ "fees": [500] })))
    }

    async fn always_unauthorized(State(api): State<MockApi>) -> AxumStatus {
        api.hits.fetch_add(1, Ordering::SeqCst);
        AxumStatus::UNAUTHORIZED
    }

    async fn broken(State(api): State<MockApi>) -> AxumStatus {
        api.hits.fetch_add(1, Ordering::SeqCst);
        AxumStatus::SERVICE_UNAVAILABLE
    }

    async fn serve(api: MockApi) -> String {
        let router = Router::new()
            .route("/api/v1/auth/refresh", post(refresh))
            .route("/api/v1/fees", get(fees))
            .route("/api/v1/locked", get(always_unauthorized))
            .route("/api/v1/broken", get(broken).post(broken))
            .with_state(api);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/api/v1")
    }

    fn gateway(base_url: String) -> RequestGateway {
        gateway_with(GatewaySettings {
            base_url,
            ..GatewaySettings::default()
        })
    }

    fn gateway_with(settings: GatewaySettings) -> RequestGateway {
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let cipher = Arc::new(CredentialCipher::new(MasterSecret::new("gateway-test")));
        let storage = SecureStorage::new(Arc::new(MemoryStore::new()), cipher);
        let credentials = Arc::new(CredentialStore::new(storage, clock.clone()));
        credentials.set_tokens("access-1", "refresh-1").unwrap();

        let env = Arc::new(Environment::new(desktop_attributes()));
        let session = Arc::new(SessionGuard::new(env, clock, DEFAULT_IDLE_TIMEOUT));
        session.init_session();

        RequestGateway::new(settings, credentials, session, Arc::new(CsrfManager::new())).unwrap()
    }

    #[tokio::test]
    async fn expired_token_refreshes_once_and_retries() {
        let api = MockApi::new();
        let gateway = gateway(serve(api.clone()).await);
        let mut signals = gateway.subscribe();

        let response = gateway.send(ApiRequest::get("/fees")).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({ "fees": [500] }));
        assert_eq!(api.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(api.hits.load(Ordering::SeqCst), 2);
        assert_eq!(gateway.credentials().access_token().as_deref(), Some("access-3"));
        assert_eq!(gateway.credentials().refresh_token().as_deref(), Some("refresh-2"));
        assert_eq!(signals.try_recv().unwrap(), AuthSignal::Refreshed);

        // The rotated token is used directly afterwards
        gateway.send(ApiRequest::get("/fees")).await.unwrap();
        assert_eq!(api.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(api.hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unauthorized_after_retry_is_not_refreshed_again() {
        let api = MockApi::new();
        let gateway = gateway(serve(api.clone()).await);

        let err = gateway.send(ApiRequest::get("/locked")).await.unwrap_err();

        assert!(matches!(err, GatewayError::Status { status: 401, .. }));
        assert_eq!(api.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(api.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejected_refresh_logs_out() {
        let api = MockApi::new();
        *api.valid_refresh.lock().unwrap() = "someone-else".to_string();
        let gateway = gateway(serve(api.clone()).await);
        let mut signals = gateway.subscribe();

        let err = gateway.send(ApiRequest::get("/fees")).await.unwrap_err();

        assert!(matches!(err, GatewayError::RefreshFailed(_)));
        assert!(err.ends_session());
        assert!(gateway.credentials().access_token().is_none());
        assert!(gateway.credentials().refresh_token().is_none());
        assert_eq!(gateway.session().state(), crate::auth::SessionState::Expired);
        assert_eq!(
            signals.try_recv().unwrap(),
            AuthSignal::LoggedOut {
                redirect_to: "/login".to_string()
            }
        );

        // New requests are blocked without hitting the network
        let hits = api.hits.load(Ordering::SeqCst);
        let err = gateway.send(ApiRequest::get("/fees")).await.unwrap_err();
        assert!(matches!(err, GatewayError::SessionExpired));
        assert_eq!(api.hits.load(Ordering::SeqCst), hits);
    }

    #[tokio::test]
    async fn missing_refresh_token_is_auth_expired() {
        let api = MockApi::new();
        let gateway = gateway(serve(api.clone()).await);
        gateway.credentials().clear().unwrap();

        let err = gateway.send(ApiRequest::get("/fees")).await.unwrap_err();

        assert!(matches!(err, GatewayError::AuthExpired));
        assert_eq!(api.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.session().state(), crate::auth::SessionState::Expired);
    }

    #[tokio::test]
    async fn concurrent_unauthorized_requests_share_one_refresh() {
        let mut api = MockApi::new();
        api.refresh_delay = Duration::from_millis(50);
        let gateway = gateway(serve(api.clone()).await);

        let (a, b) = tokio::join!(
            gateway.send(ApiRequest::get("/fees")),
            gateway.send(ApiRequest::get("/fees"))
        );

        assert_eq!(a.unwrap().status, 200);
        assert_eq!(b.unwrap().status, 200);
        assert_eq!(api.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_errors_propagate_unchanged() {
        let api = MockApi::new();
        let gateway = gateway(serve(api.clone()).await);

        let err = gateway.send(ApiRequest::get("/broken")).await.unwrap_err();

        assert!(matches!(err, GatewayError::Status { status: 503, .. }));
        assert!(err.is_transient());
        assert_eq!(api.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(api.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn requests_without_session_are_rejected() {
        let api = MockApi::new();
        let clock = Arc::new(ManualClock::at_millis(0));
        let cipher = Arc::new(CredentialCipher::new(MasterSecret::new("s")));
        let storage = SecureStorage::new(Arc::new(MemoryStore::new()), cipher);
        let gateway = RequestGateway::new(
            GatewaySettings {
                base_url: serve(api.clone()).await,
                ..GatewaySettings::default()
            },
            Arc::new(CredentialStore::new(storage, clock.clone())),
            Arc::new(SessionGuard::new(
                Arc::new(Environment::new(desktop_attributes())),
                clock,
                DEFAULT_IDLE_TIMEOUT,
            )),
            Arc::new(CsrfManager::new()),
        )
        .unwrap();

        let err = gateway.send(ApiRequest::get("/fees")).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoSession));
        assert_eq!(api.hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let clock = Arc::new(ManualClock::at_millis(0));
        let cipher = Arc::new(CredentialCipher::new(MasterSecret::new("s")));
        let storage = SecureStorage::new(Arc::new(MemoryStore::new()), cipher);
        let result = RequestGateway::new(
            GatewaySettings {
                base_url: "not a url".to_string(),
                ..GatewaySettings::default()
            },
            Arc::new(CredentialStore::new(storage, clock.clone())),
            Arc::new(SessionGuard::new(
                Arc::new(Environment::new(desktop_attributes())),
                clock,
                DEFAULT_IDLE_TIMEOUT,
            )),
            Arc::new(CsrfManager::new()),
        );
        assert!(matches!(result, Err(GatewayError::InvalidUrl(_))));
    }

    #[test]
    fn refresh_wire_format_is_camel_case() {
        assert_eq!(
            serde_json::to_value(RefreshRequest { refresh_token: "r" }).unwrap(),
            json!({ "refreshToken": "r" })
        );
        let parsed: RefreshResponse =
            serde_json::from_value(json!({ "accessToken": "a", "refreshToken": "b" })).unwrap();
        assert_eq!(parsed.access_token, "a");
        assert_eq!(parsed.refresh_token, "b");
    }

    #[test]
    fn mutations_map_to_methods() {
        let create = ApiRequest::mutation(ActionKind::Create, "/payments", json!({ "amount": 500 }));
        assert_eq!(create.method, Method::POST);
        assert_eq!(create.body, Some(json!({ "amount": 500 })));

        assert_eq!(ApiRequest::mutation(ActionKind::Update, "/payments/1", json!({})).method, Method::PUT);

        let delete = ApiRequest::mutation(ActionKind::Delete, "/payments/1", Value::Null);
        assert_eq!(delete.method, Method::DELETE);
        assert!(delete.body.is_none());
        assert!(!delete.retried);
    }

    #[tokio::test]
    async fn unreachable_refresh_endpoint_keeps_credentials() {
        let api = MockApi::new();
        let base_url = serve(api.clone()).await;
        // Nothing listens on port 1
        let gateway = gateway_with(GatewaySettings {
            base_url,
            refresh_path: "http://127.0.0.1:1/auth/refresh".to_string(),
            ..GatewaySettings::default()
        });
        let mut signals = gateway.subscribe();

        let err = gateway.send(ApiRequest::get("/fees")).await.unwrap_err();

        assert!(matches!(err, GatewayError::Transport(_)));
        assert!(err.is_transient());
        assert!(!err.ends_session());
        assert_eq!(gateway.credentials().refresh_token().as_deref(), Some("refresh-1"));
        assert_eq!(gateway.session().state(), crate::auth::SessionState::Active);
        assert!(signals.try_recv().is_err());
    }

    #[tokio::test]
    async fn refresh_server_error_is_retryable() {
        let api = MockApi::new();
        let base_url = serve(api.clone()).await;
        let gateway = gateway_with(GatewaySettings {
            base_url,
            refresh_path: "/broken".to_string(),
            ..GatewaySettings::default()
        });

        let err = gateway.send(ApiRequest::get("/fees")).await.unwrap_err();

        assert!(matches!(err, GatewayError::Status { status: 503, .. }));
        assert!(err.is_transient());
        assert!(gateway.credentials().access_token().is_some());
    }
}
