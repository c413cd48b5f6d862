// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Offline Action Queue
//!
//! Durable FIFO of mutations that could not be sent. Each tab owns one queue,
//! persisted (encrypted) under `offline_queue:<owner>` after every change.
//!
//! ## Ownership
//!
//! A [`QueueDirectory`] is shared by the tabs of one origin and tracks which
//! owners are open. A persisted queue whose owner is closed is an orphan. The
//! next queue that opens or drains adopts its actions and deletes the orphan
//! key in the same storage write, so an action is never held by two queues.
//!
//! ## Drain
//!
//! - One drain at a time per queue; a concurrent call returns immediately
//! - Oldest first; stops as soon as the tab goes offline
//! - Success removes the action
//! - Failure increments `retry_count`; past `max_retries` the action is
//!   dropped and reported as a terminal failure
//! - A halting failure (no usable session) stops the drain and is not
//!   counted against the action
//! - After a failure, later actions on the same endpoint wait for the next
//!   drain so per-resource order is kept

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::connectivity::Connectivity;
use crate::storage::{SecureStorage, StoreError};

/// Prefix of every persisted queue key.
pub const QUEUE_KEY_PREFIX: &str = "offline_queue:";

/// Retries allowed before an action is dropped.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Storage key of the queue owned by `owner`.
pub fn queue_key(owner: &str) -> String {
    format!("{QUEUE_KEY_PREFIX}{owner}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedAction {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub endpoint: String,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub next_id: u64,
    pub actions: Vec<QueuedAction>,
}

impl QueueSnapshot {
    /// Raise `next_id` above every stored id.
    fn normalize(mut self) -> Self {
        let floor = self.actions.iter().map(|a| a.id).max().unwrap_or(0) + 1;
        self.next_id = self.next_id.max(floor);
        self
    }
}

/// A failed replay attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DispatchError {
    pub message: String,
    /// The tab has no usable session; stop without counting the attempt.
    pub halt: bool,
}

impl DispatchError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            halt: false,
        }
    }

    pub fn halting(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            halt: true,
        }
    }
}

/// Sends one queued action to the remote API.
pub trait ActionDispatcher: Send + Sync {
    fn dispatch(
        &self,
        action: &QueuedAction,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue persistence failed: {0}")]
    Store(#[from] StoreError),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// An action dropped after exhausting its retries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalFailure {
    pub action: QueuedAction,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    /// Another drain was in flight; nothing was done.
    pub skipped: bool,
    /// Actions taken over from closed owners at the start of this drain.
    pub adopted: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub retried: usize,
    pub terminal: Vec<TerminalFailure>,
    /// Held back behind an earlier failure on the same endpoint.
    pub deferred: usize,
    pub stopped_offline: bool,
    pub halted: bool,
    pub remaining: usize,
}

/// Origin-wide registry of open queue owners.
pub struct QueueDirectory {
    storage: SecureStorage,
    clock: Arc<dyn Clock>,
    max_retries: u32,
    live: Mutex<HashSet<String>>,
}

impl QueueDirectory {
    pub fn new(storage: SecureStorage, clock: Arc<dyn Clock>, max_retries: u32) -> Self {
        Self {
            storage,
            clock,
            max_retries,
            live: Mutex::new(HashSet::new()),
        }
    }

    /// Open the queue of `owner`, restoring its own actions and adopting
    /// those of closed owners. An unreadable snapshot starts empty.
    pub fn open(self: &Arc<Self>, owner: impl Into<String>) -> QueueResult<ActionQueue> {
        let owner = owner.into();
        let key = queue_key(&owner);
        self.live().insert(owner.clone());

        let snapshot = self
            .storage
            .get_json::<QueueSnapshot>(&key)
            .unwrap_or_default()
            .normalize();

        let queue = ActionQueue {
            directory: Arc::clone(self),
            owner,
            key,
            state: Mutex::new(snapshot),
            draining: AtomicBool::new(false),
        };
        queue.adopt_orphans()?;

        if !queue.is_empty() {
            info!(owner = %queue.owner, pending = queue.len(), "Restored offline queue");
        }
        Ok(queue)
    }

    pub fn is_live(&self, owner: &str) -> bool {
        self.live().contains(owner)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn live(&self) -> MutexGuard<'_, HashSet<String>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct ActionQueue {
    directory: Arc<QueueDirectory>,
    owner: String,
    key: String,
    state: Mutex<QueueSnapshot>,
    draining: AtomicBool,
}

impl ActionQueue {
    /// Append an action. Never touches the network.
    pub fn enqueue(
        &self,
        kind: ActionKind,
        endpoint: impl Into<String>,
        payload: Value,
    ) -> QueueResult<QueuedAction> {
        let mut state = self.lock();
        let action = QueuedAction {
            id: state.next_id,
            kind,
            endpoint: endpoint.into(),
            payload,
            enqueued_at: self.directory.clock.now(),
            retry_count: 0,
        };
        state.next_id += 1;
        state.actions.push(action.clone());
        self.persist(&state)?;

        debug!(action_id = action.id, kind = ?action.kind, endpoint = %action.endpoint, "Queued action");
        Ok(action)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn len(&self) -> usize {
        self.lock().actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().actions.is_empty()
    }

    pub fn actions(&self) -> Vec<QueuedAction> {
        self.lock().actions.clone()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.lock().clone()
    }

    pub fn max_retries(&self) -> u32 {
        self.directory.max_retries
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Take over the persisted actions of every closed owner.
    ///
    /// Adopted actions are appended oldest first with fresh ids. Unreadable
    /// orphans are discarded.
    pub fn adopt_orphans(&self) -> QueueResult<usize> {
        let live = self.directory.live();
        let storage = &self.directory.storage;

        let mut claimed = Vec::new();
        let mut orphaned = Vec::new();
        for key in storage.keys_with_prefix(QUEUE_KEY_PREFIX)? {
            if live.contains(&key[QUEUE_KEY_PREFIX.len()..]) {
                continue;
            }
            if let Some(snapshot) = storage.get_json::<QueueSnapshot>(&key) {
                orphaned.extend(snapshot.actions);
            }
            claimed.push(key);
        }
        if claimed.is_empty() {
            return Ok(0);
        }

        orphaned.sort_by_key(|action| action.enqueued_at);
        let adopted = orphaned.len();

        let mut state = self.lock();
        let mut next = state.clone();
        for mut action in orphaned {
            action.id = next.next_id;
            next.next_id += 1;
            next.actions.push(action);
        }

        let sealed = storage.seal(&next)?;
        let removed: Vec<&str> = claimed.iter().map(String::as_str).collect();
        storage.apply_sealed(&[(self.key.as_str(), sealed.as_str())], &removed)?;
        *state = next;

        info!(owner = %self.owner, adopted, queues = claimed.len(), "Adopted orphaned queue actions");
        Ok(adopted)
    }

    /// Replay queued actions through `dispatcher`.
    pub async fn drain<D: ActionDispatcher>(
        &self,
        dispatcher: &D,
        connectivity: &Connectivity,
    ) -> QueueResult<DrainReport> {
        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            debug!("Drain already in progress, skipping");
            return Ok(DrainReport {
                skipped: true,
                remaining: self.len(),
                ..DrainReport::default()
            });
        };

        let mut report = DrainReport {
            adopted: self.adopt_orphans()?,
            ..DrainReport::default()
        };
        let pending = self.actions();
        let mut blocked: HashSet<String> = HashSet::new();

        for action in pending {
            if !connectivity.is_online() {
                report.stopped_offline = true;
                break;
            }
            if blocked.contains(&action.endpoint) {
                report.deferred += 1;
                continue;
            }

            match dispatcher.dispatch(&action).await {
                Ok(()) => {
                    report.attempted += 1;
                    self.remove(action.id)?;
                    report.succeeded += 1;
                    debug!(action_id = action.id, endpoint = %action.endpoint, "Replayed action");
                }
                Err(e) if e.halt => {
                    warn!(action_id = action.id, error = %e, "No usable session, drain halted");
                    report.halted = true;
                    break;
                }
                Err(e) => {
                    report.attempted += 1;
                    blocked.insert(action.endpoint.clone());
                    match self.record_failure(action.id)? {
                        Some(dropped) => {
                            warn!(
                                action_id = dropped.id,
                                endpoint = %dropped.endpoint,
                                retry_count = dropped.retry_count,
                                error = %e,
                                "Dropping action after exhausting retries"
                            );
                            report.terminal.push(TerminalFailure {
                                action: dropped,
                                error: e.message.clone(),
                            });
                        }
                        None => {
                            report.retried += 1;
                            debug!(action_id = action.id, error = %e, "Replay failed, will retry");
                        }
                    }
                }
            }
        }

        report.remaining = self.len();
        info!(
            owner = %self.owner,
            attempted = report.attempted,
            succeeded = report.succeeded,
            retried = report.retried,
            terminal = report.terminal.len(),
            remaining = report.remaining,
            "Drain finished"
        );
        Ok(report)
    }

    fn remove(&self, id: u64) -> QueueResult<()> {
        let mut state = self.lock();
        state.actions.retain(|a| a.id != id);
        self.persist(&state)
    }

    /// Count a failed attempt. Returns the action if it was dropped.
    fn record_failure(&self, id: u64) -> QueueResult<Option<QueuedAction>> {
        let mut state = self.lock();
        let Some(index) = state.actions.iter().position(|a| a.id == id) else {
            return Ok(None);
        };

        state.actions[index].retry_count += 1;
        let dropped = if state.actions[index].retry_count > self.directory.max_retries {
            Some(state.actions.remove(index))
        } else {
            None
        };
        self.persist(&state)?;
        Ok(dropped)
    }

    fn persist(&self, state: &QueueSnapshot) -> QueueResult<()> {
        self.directory.storage.set_json(&self.key, state)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, QueueSnapshot> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ActionQueue {
    /// Mark the owner closed. A non-empty queue stays persisted for adoption.
    fn drop(&mut self) {
        let mut live = self.directory.live();
        live.remove(&self.owner);
        if self.lock().actions.is_empty() {
            if let Err(e) = self.directory.storage.remove_many(&[self.key.as_str()]) {
                warn!(owner = %self.owner, error = %e, "Failed to remove empty queue");
            }
        }
        debug!(owner = %self.owner, "Queue closed");
    }
}

/// Busy flag held for the duration of one drain.
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
