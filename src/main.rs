// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Headless sync worker: opens one tab on the configured origin store and
//! keeps its offline queue draining until interrupted.

use std::sync::Arc;

use feeportal_guard::auth::{Environment, EnvironmentAttributes};
use feeportal_guard::clock::SystemClock;
use feeportal_guard::config::GuardConfig;
use feeportal_guard::context::Origin;
use feeportal_guard::logging::init_tracing;
use feeportal_guard::sync::SyncEvent;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = match GuardConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    init_tracing(config.log_format);

    let origin = match Origin::open(config, Arc::new(SystemClock)) {
        Ok(origin) => origin,
        Err(e) => {
            error!(error = %e, code = e.error_code(), "Failed to open origin store");
            std::process::exit(1);
        }
    };

    let environment = Arc::new(Environment::new(EnvironmentAttributes::from_process()));
    let mut tab = match origin.open_tab(environment) {
        Ok(tab) => tab,
        Err(e) => {
            error!(error = %e, code = e.error_code(), "Failed to open tab");
            std::process::exit(1);
        }
    };

    info!(
        api_base_url = %origin.config().api_base_url,
        pending = tab.queue().len(),
        "FeePortal sync worker started"
    );
    if !tab.is_authenticated() {
        warn!("No stored credentials; queued actions wait for sign-in");
    }

    let shutdown = CancellationToken::new();
    let scheduler = tab.spawn_scheduler(shutdown.clone());
    let mut events = scheduler.subscribe();

    if let Err(e) = scheduler.start_sync().await {
        error!(error = %e, "Scheduler exited before start");
        std::process::exit(1);
    }
    if let Err(e) = scheduler.sync_now().await {
        warn!(error = %e, "Initial sync not scheduled");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            event = events.recv() => match event {
                Ok(SyncEvent::SyncComplete { report }) => {
                    tab.pump();
                    tab.take_notices();
                    info!(
                        succeeded = report.succeeded,
                        retried = report.retried,
                        remaining = report.remaining,
                        discarded = report.terminal.len(),
                        "Sync complete"
                    );
                }
                Ok(SyncEvent::SyncError { error }) => warn!(error = %error, "Sync error"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed sync events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    shutdown.cancel();
    scheduler.join().await;
    info!("FeePortal sync worker stopped");
}
