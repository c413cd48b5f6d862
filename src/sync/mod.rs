// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Offline Sync
//!
//! - [`ActionQueue`] / [`QueueDirectory`] - durable per-tab FIFO of mutations made while offline
//! - [`SyncScheduler`] - background drainer driven by commands
//! - [`LwwRegister`] / [`FieldReplica`] - last-write-wins conflict resolution
//! - [`CrossTabBus`] - state propagation between tabs of one origin

pub mod bus;
pub mod lww;
pub mod queue;
pub mod scheduler;

pub use bus::{CrossTabBus, TabChannel, TabId, TabMessage};
pub use lww::{FieldReplica, LwwRegister, WriterId};
pub use queue::{
    queue_key, ActionDispatcher, ActionKind, ActionQueue, DispatchError, DrainReport,
    QueueDirectory, QueueError, QueuedAction, TerminalFailure, DEFAULT_MAX_RETRIES,
    QUEUE_KEY_PREFIX,
};
pub use scheduler::{SchedulerError, SyncCommand, SyncEvent, SyncHandle, SyncScheduler};
