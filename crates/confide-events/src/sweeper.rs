// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use std::time::Duration;

use confide_scheduler::CancelToken;
use confide_store::Database;
use tokio::sync::Mutex;

/// Periodically deletes events older than `ttl`, so `pipeline_events` does
/// not grow unbounded on a long-running node (§4.7, §6 `EVENT_SWEEP_TTL_HOURS`).
/// Runs until `cancel` fires; intended to be spawned once per node lifetime,
/// not per patient.
pub async fn run_sweeper(store: Arc<Mutex<Database>>, ttl: Duration, interval: Duration, cancel: CancelToken) {
    let ttl_hours = (ttl.as_secs() / 3600).max(1);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {
                let removed = {
                    let db = store.lock().await;
                    db.sweep_events(ttl_hours)
                };
                match removed {
                    Ok(n) if n > 0 => tracing::debug!(removed = n, "swept expired pipeline events"),
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "event sweep failed"),
                }
            }
        }
    }
}
