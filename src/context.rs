// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Origin and Tab Contexts
//!
//! An [`Origin`] owns what every tab of one browser profile shares: the raw
//! store, the cipher, the cross-tab bus and the connectivity signal. Each tab
//! gets its own [`TabContext`] with its own session, gateway, queue and state
//! replica.
//!
//! ## State Propagation
//!
//! Every local auth or field mutation publishes a `STATE_UPDATE`. A receiving
//! tab overwrites its auth state with the sender's and merges the field
//! registers. Logging out in one tab therefore logs out every tab.
//!
//! ## Notices
//!
//! Queue actions dropped after their last retry reach the user through the
//! origin's [`NoticeSink`] when the tab is pumped, and stay available from
//! [`TabContext::take_notices`] until dismissed.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{
    CredentialStore, Environment, PermissionTable, SessionError, SessionGuard, SessionState,
};
use crate::clock::Clock;
use crate::config::GuardConfig;
use crate::connectivity::Connectivity;
use crate::crypto::CredentialCipher;
use crate::error::{GuardError, GuardResult};
use crate::http::{ApiRequest, ApiResponse, AuthSignal, CsrfManager, RequestGateway};
use crate::state::{AuthState, AuthTransition, SharedState, UserProfile};
use crate::storage::{KeyValueStore, RedbStore, SecureStorage};
use crate::sync::{
    ActionKind, ActionQueue, CrossTabBus, QueueDirectory, QueuedAction, SyncEvent, SyncHandle,
    SyncScheduler, TabChannel, TabId, TabMessage, TerminalFailure, WriterId,
};

/// Delivers user-facing notices.
pub trait NoticeSink: Send + Sync {
    fn deliver(&self, notice: &GuardError);
}

/// Sink that writes notices to the log.
#[derive(Debug, Default)]
pub struct LogNotices;

impl NoticeSink for LogNotices {
    fn deliver(&self, notice: &GuardError) {
        warn!(code = notice.error_code(), message = %notice.user_message(), "User notice");
    }
}

/// Everything shared by the tabs of one origin.
pub struct Origin {
    config: GuardConfig,
    kv: Arc<dyn KeyValueStore>,
    cipher: Arc<CredentialCipher>,
    bus: CrossTabBus,
    clock: Arc<dyn Clock>,
    connectivity: Connectivity,
    permissions: Arc<PermissionTable>,
    csrf: Arc<CsrfManager>,
    queues: Arc<QueueDirectory>,
    notices: Arc<dyn NoticeSink>,
}

impl Origin {
    pub fn new(config: GuardConfig, kv: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        let cipher = Arc::new(CredentialCipher::new(config.crypto_secret.clone()));
        let queues = Arc::new(QueueDirectory::new(
            SecureStorage::new(kv.clone(), cipher.clone()),
            clock.clone(),
            config.max_retries,
        ));
        Self {
            config,
            kv,
            cipher,
            bus: CrossTabBus::default(),
            clock,
            connectivity: Connectivity::default(),
            permissions: Arc::new(PermissionTable::fee_portal_defaults()),
            csrf: Arc::new(CsrfManager::new()),
            queues,
            notices: Arc::new(LogNotices),
        }
    }

    /// Origin backed by the redb file under the configured data directory.
    pub fn open(config: GuardConfig, clock: Arc<dyn Clock>) -> GuardResult<Self> {
        let path = config.data_dir.join(crate::storage::redb_store::STORE_FILE_NAME);
        let store = RedbStore::open(&path)?;
        info!(path = %path.display(), "Opened origin store");
        Ok(Self::new(config, Arc::new(store), clock))
    }

    pub fn with_permissions(mut self, permissions: PermissionTable) -> Self {
        self.permissions = Arc::new(permissions);
        self
    }

    pub fn with_notice_sink(mut self, notices: Arc<dyn NoticeSink>) -> Self {
        self.notices = notices;
        self
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn bus(&self) -> &CrossTabBus {
        &self.bus
    }

    /// The origin's single CSRF cookie, shared by every tab.
    pub fn csrf(&self) -> &Arc<CsrfManager> {
        &self.csrf
    }

    pub fn queues(&self) -> &Arc<QueueDirectory> {
        &self.queues
    }

    /// Open a tab running in `environment`.
    ///
    /// A tab opened while credentials are stored starts its own session, as
    /// a browser tab does when the user is already signed in.
    pub fn open_tab(&self, environment: Arc<Environment>) -> GuardResult<TabContext> {
        let storage = SecureStorage::new(self.kv.clone(), self.cipher.clone());
        let credentials = Arc::new(CredentialStore::new(storage, self.clock.clone()));
        let session = Arc::new(SessionGuard::new(
            environment.clone(),
            self.clock.clone(),
            self.config.session_timeout,
        ));
        let gateway = Arc::new(RequestGateway::new(
            self.config.gateway_settings(),
            credentials.clone(),
            session.clone(),
            self.csrf.clone(),
        )?);

        let channel = self.bus.join();
        let queue = Arc::new(self.queues.open(channel.id().to_string())?);
        let writer = WriterId::for_tab(&environment.fingerprint());
        let auth_signals = gateway.subscribe();

        let mut state = SharedState::default();
        if credentials.has_credentials() {
            session.init_session();
            state.auth.is_authenticated = true;
        }

        info!(
            tab_id = %channel.id(),
            writer_id = %writer,
            authenticated = state.auth.is_authenticated,
            "Tab opened"
        );
        Ok(TabContext {
            writer,
            clock: self.clock.clone(),
            credentials,
            session,
            gateway,
            queue,
            connectivity: self.connectivity.clone(),
            channel,
            auth_signals,
            sync_events: None,
            state,
            permissions: self.permissions.clone(),
            sync_interval: self.config.sync_interval,
            notices: self.notices.clone(),
            pending_notices: Vec::new(),
        })
    }
}

/// Outcome of [`TabContext::submit`].
#[derive(Debug)]
pub enum Submission {
    Sent(ApiResponse),
    Queued(QueuedAction),
}

/// One open tab.
pub struct TabContext {
    writer: WriterId,
    clock: Arc<dyn Clock>,
    credentials: Arc<CredentialStore>,
    session: Arc<SessionGuard>,
    gateway: Arc<RequestGateway>,
    queue: Arc<ActionQueue>,
    connectivity: Connectivity,
    channel: TabChannel,
    auth_signals: broadcast::Receiver<AuthSignal>,
    sync_events: Option<broadcast::Receiver<SyncEvent>>,
    state: SharedState,
    permissions: Arc<PermissionTable>,
    sync_interval: Duration,
    notices: Arc<dyn NoticeSink>,
    pending_notices: Vec<GuardError>,
}

impl TabContext {
    /// Store the credential pair, start a session and tell the other tabs.
    pub fn login(&mut self, user: UserProfile, access: &str, refresh: &str) -> GuardResult<()> {
        self.credentials.set_tokens(access, refresh)?;
        self.session.init_session();
        info!(user_id = %user.id, role = %user.role, "Logged in");
        self.state.auth = AuthState::logged_in(user);
        self.publish(Some(AuthTransition::Login));
        Ok(())
    }

    pub fn logout(&mut self) -> GuardResult<()> {
        self.credentials.clear()?;
        self.session.end_session();
        info!("Logged out");
        self.state.auth = AuthState::logged_out();
        self.publish(Some(AuthTransition::Logout));
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.auth.is_authenticated
    }

    /// Validate the session, recording activity. A violation logs out.
    pub fn check_session(&mut self) -> GuardResult<()> {
        match self.session.validate() {
            Ok(()) => Ok(()),
            Err(SessionError::Tamper) => {
                self.expire("fingerprint mismatch");
                Err(GuardError::SessionTamper)
            }
            Err(SessionError::Idle) => {
                self.expire("idle timeout");
                Err(GuardError::AuthExpired)
            }
            Err(SessionError::Ended) => Err(GuardError::AuthExpired),
            Err(SessionError::NotStarted) => Err(GuardError::NotAuthenticated),
        }
    }

    /// Send a mutation, or queue it when it cannot be delivered now.
    pub async fn submit(
        &mut self,
        kind: ActionKind,
        endpoint: &str,
        payload: Value,
    ) -> GuardResult<Submission> {
        self.check_session()?;

        if !self.connectivity.is_online() {
            let action = self.queue.enqueue(kind, endpoint, payload)?;
            return Ok(Submission::Queued(action));
        }

        let request = ApiRequest::mutation(kind, endpoint, payload.clone());
        match self.gateway.send(request).await {
            Ok(response) => Ok(Submission::Sent(response)),
            Err(e) if e.is_transient() => {
                warn!(endpoint = %endpoint, error = %e, "Mutation failed, queued for replay");
                let action = self.queue.enqueue(kind, endpoint, payload)?;
                Ok(Submission::Queued(action))
            }
            Err(e) => {
                let err = GuardError::from(e);
                if err.forces_logout() {
                    self.pump();
                }
                Err(err)
            }
        }
    }

    /// Local write to a register-backed field. Returns whether it was accepted.
    pub fn update_field(&mut self, key: &str, value: Value) -> bool {
        let accepted = self
            .state
            .fields
            .set(key, value, &self.writer, self.clock.now_millis());
        if accepted {
            self.publish(None);
        }
        accepted
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.state.fields.get(key)
    }

    /// Apply a message from a sibling tab.
    pub fn apply_incoming(&mut self, message: TabMessage) {
        match message {
            TabMessage::StateUpdate { state } => {
                let changed = self.state.fields.merge(&state.fields);
                if changed > 0 {
                    debug!(fields = changed, "Merged fields from sibling tab");
                }

                // Auth is authoritative, never merged
                self.state.auth = state.auth;
                match state.transition {
                    Some(AuthTransition::Logout) => self.session.end_session(),
                    Some(AuthTransition::Login) => {
                        if self.session.state() != SessionState::Active {
                            self.session.init_session();
                        }
                    }
                    Some(AuthTransition::TokenRefresh) | None => {}
                }
            }
        }
    }

    /// Process pending sibling messages, gateway signals and sync events.
    ///
    /// Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;

        while let Some(message) = self.channel.try_recv() {
            self.apply_incoming(message);
            handled += 1;
        }

        loop {
            match self.auth_signals.try_recv() {
                Ok(AuthSignal::Refreshed) => {
                    self.publish(Some(AuthTransition::TokenRefresh));
                    handled += 1;
                }
                Ok(AuthSignal::LoggedOut { redirect_to }) => {
                    info!(redirect_to = %redirect_to, "Session ended by gateway");
                    self.state.auth = AuthState::logged_out();
                    self.publish(Some(AuthTransition::Logout));
                    handled += 1;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed gateway signals");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        let mut dropped: Vec<TerminalFailure> = Vec::new();
        if let Some(events) = self.sync_events.as_mut() {
            loop {
                match events.try_recv() {
                    Ok(SyncEvent::SyncComplete { report }) => {
                        dropped.extend(report.terminal);
                        handled += 1;
                    }
                    Ok(SyncEvent::SyncError { error }) => {
                        debug!(error = %error, "Sync error observed");
                        handled += 1;
                    }
                    Err(TryRecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed sync events");
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }
        }
        for failure in dropped {
            self.notify(GuardError::from(failure));
        }

        handled
    }

    /// Notices not yet dismissed, oldest first. Taking them dismisses them.
    pub fn take_notices(&mut self) -> Vec<GuardError> {
        std::mem::take(&mut self.pending_notices)
    }

    /// Start the background drainer for this tab's queue.
    pub fn spawn_scheduler(&mut self, shutdown: CancellationToken) -> SyncHandle {
        let handle = SyncScheduler::new(
            self.queue.clone(),
            self.gateway.clone(),
            self.connectivity.clone(),
        )
        .with_interval(self.sync_interval)
        .spawn(shutdown);
        self.sync_events = Some(handle.subscribe());
        handle
    }

    /// Advisory permission check for the signed-in user.
    pub fn can(&self, section: &str, subsection: Option<&str>, action: &str) -> bool {
        match self.state.auth.role() {
            Some(role) if self.state.auth.is_authenticated => {
                self.permissions.allows(role, section, subsection, action)
            }
            _ => false,
        }
    }

    pub fn id(&self) -> TabId {
        self.channel.id()
    }

    pub fn writer_id(&self) -> &WriterId {
        &self.writer
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn queue(&self) -> &Arc<ActionQueue> {
        &self.queue
    }

    pub fn gateway(&self) -> &Arc<RequestGateway> {
        &self.gateway
    }

    pub fn session(&self) -> &Arc<SessionGuard> {
        &self.session
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    fn expire(&mut self, reason: &str) {
        self.gateway.force_logout(reason);
        // Drop the signal we just caused; the broadcast below covers it
        while let Ok(signal) = self.auth_signals.try_recv() {
            debug!(?signal, "Discarding local gateway signal");
        }
        self.state.auth = AuthState::logged_out();
        self.publish(Some(AuthTransition::Logout));
    }

    fn notify(&mut self, notice: GuardError) {
        self.notices.deliver(&notice);
        self.pending_notices.push(notice);
    }

    fn publish(&self, transition: Option<AuthTransition>) {
        let mut snapshot = self.state.clone();
        snapshot.transition = transition;
        let reached = self.channel.publish(TabMessage::StateUpdate { state: snapshot });
        debug!(tabs = reached, ?transition, "Published state update");
    }
}
