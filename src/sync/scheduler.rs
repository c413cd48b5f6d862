// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Sync Scheduler
//!
//! Background task that drains the [`ActionQueue`] so callers never wait on
//! replay. It is driven by typed commands and reports through typed events.
//!
//! ## Triggers
//!
//! - `START_SYNC` arms a fixed interval (default 30 s, first drain one period
//!   later); `STOP_SYNC` disarms it
//! - `SYNC_NOW` drains immediately
//! - The offline to online transition drains immediately
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`, like the other background
//! tasks. Dropping the [`SyncHandle`] also stops the task.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::queue::{ActionDispatcher, ActionQueue, DrainReport};
use crate::connectivity::Connectivity;

/// Default interval between scheduled drains.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncCommand {
    StartSync,
    StopSync,
    SyncNow,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncEvent {
    SyncComplete { report: DrainReport },
    SyncError { error: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("sync scheduler has stopped")]
    Stopped,
}

pub struct SyncScheduler<D> {
    queue: Arc<ActionQueue>,
    dispatcher: Arc<D>,
    connectivity: Connectivity,
    interval: Duration,
}

impl<D: ActionDispatcher + 'static> SyncScheduler<D> {
    pub fn new(queue: Arc<ActionQueue>, dispatcher: Arc<D>, connectivity: Connectivity) -> Self {
        Self {
            queue,
            dispatcher,
            connectivity,
            interval: DEFAULT_SYNC_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn the scheduler task.
    pub fn spawn(self, shutdown: CancellationToken) -> SyncHandle {
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (events_tx, _) = broadcast::channel(64);
        let events = events_tx.clone();

        // Baseline taken here so a transition right after spawn is not missed
        let mut online_rx = self.connectivity.subscribe();
        let was_online = *online_rx.borrow_and_update();
        let task = tokio::spawn(self.run(commands_rx, events_tx, online_rx, was_online, shutdown));

        SyncHandle {
            commands: commands_tx,
            events,
            task,
        }
    }

    async fn run(
        self,
        mut commands: mpsc::Receiver<SyncCommand>,
        events: broadcast::Sender<SyncEvent>,
        mut online_rx: watch::Receiver<bool>,
        mut was_online: bool,
        shutdown: CancellationToken,
    ) {
        info!(interval_secs = self.interval.as_secs(), "Sync scheduler starting");

        let mut ticker: Option<Interval> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Sync scheduler shutting down");
                    return;
                }
                command = commands.recv() => match command {
                    Some(SyncCommand::StartSync) => {
                        if ticker.is_none() {
                            let mut interval = interval_at(Instant::now() + self.interval, self.interval);
                            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                            ticker = Some(interval);
                            debug!("Periodic sync armed");
                        }
                    }
                    Some(SyncCommand::StopSync) => {
                        if ticker.take().is_some() {
                            debug!("Periodic sync disarmed");
                        }
                    }
                    Some(SyncCommand::SyncNow) => self.sync_now(&events).await,
                    None => {
                        info!("Sync handle dropped, scheduler stopping");
                        return;
                    }
                },
                _ = next_tick(&mut ticker) => self.sync_now(&events).await,
                changed = online_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let online = *online_rx.borrow_and_update();
                    if online && !was_online {
                        debug!("Back online, draining queue");
                        self.sync_now(&events).await;
                    }
                    was_online = online;
                }
            }
        }
    }

    async fn sync_now(&self, events: &broadcast::Sender<SyncEvent>) {
        let event = match self.queue.drain(self.dispatcher.as_ref(), &self.connectivity).await {
            Ok(report) => SyncEvent::SyncComplete { report },
            Err(e) => {
                warn!(error = %e, "Sync failed");
                SyncEvent::SyncError {
                    error: e.to_string(),
                }
            }
        };
        // No subscribers is fine
        let _ = events.send(event);
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Control side of a running scheduler.
pub struct SyncHandle {
    commands: mpsc::Sender<SyncCommand>,
    events: broadcast::Sender<SyncEvent>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub async fn send(&self, command: SyncCommand) -> Result<(), SchedulerError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SchedulerError::Stopped)
    }

    pub async fn start_sync(&self) -> Result<(), SchedulerError> {
        self.send(SyncCommand::StartSync).await
    }

    pub async fn stop_sync(&self) -> Result<(), SchedulerError> {
        self.send(SyncCommand::StopSync).await
    }

    pub async fn sync_now(&self) -> Result<(), SchedulerError> {
        self.send(SyncCommand::SyncNow).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Wait for the task to exit after shutdown was requested.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "Sync scheduler task failed");
        }
    }
}
