// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Server startup — binds the HTTP listener and spawns the background
//! sweeper that ages out stale pipeline events (§4.7's `EVENT_SWEEP_TTL_HOURS`).

use std::sync::Arc;
use std::time::Duration;

use confide_config::Config;
use confide_model::{ChatProvider, RemoteProvider};
use confide_scheduler::{CancelToken, SchedulerContext};
use confide_store::Database;

use crate::config::NodeConfig;
use crate::http::router;
use crate::state::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

pub async fn run(node_config: NodeConfig, pipeline_config: Config, db: Database) -> anyhow::Result<()> {
    let pipeline_config = Arc::new(pipeline_config);
    let provider: Arc<dyn ChatProvider> =
        Arc::new(RemoteProvider::new(pipeline_config.remote.base_url.clone(), pipeline_config.remote.api_key.clone()));
    let scheduler = SchedulerContext::new(provider, pipeline_config.pool_size);
    let state = AppState::new(db, scheduler, pipeline_config.clone());

    tokio::spawn(confide_events::run_sweeper(
        state.db.clone(),
        pipeline_config.event_sweep_ttl(),
        SWEEP_INTERVAL,
        CancelToken::new(),
    ));

    let app = router(state);
    tracing::info!(addr = %node_config.bind_addr, "starting confide HTTP server");

    let listener = tokio::net::TcpListener::bind(node_config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_fails_fast_on_an_unbindable_address() {
        let node_config = NodeConfig { bind_addr: "0.0.0.0:0".parse().unwrap() };
        // port 0 lets the OS pick a free port, so this should succeed in
        // binding; the test exists to document that `run` is awaitable and
        // surfaces bind errors through `anyhow::Result` rather than panicking.
        let db = Database::open_in_memory().unwrap();
        let pipeline_config = Config {
            pool_size: 1,
            compaction_strategy: confide_config::CompactionStrategy::Full,
            remote: confide_config::RemoteConfig { api_key: "k".into(), base_url: "http://localhost:1".into() },
            event_sweep_ttl_hours: 1,
            sse_keepalive_seconds: 30,
            debounce_ms: 10,
        };
        let result = tokio::time::timeout(Duration::from_millis(50), run(node_config, pipeline_config, db)).await;
        // Either still running (timed out, meaning it bound fine) or returned
        // an error — both are acceptable; a panic is not.
        let _ = result;
    }
}
