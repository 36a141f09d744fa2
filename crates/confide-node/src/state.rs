// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use confide_events::EventBus;
use confide_scheduler::{DebounceCoalescer, SchedulerContext};
use confide_store::Database;
use tokio::sync::Mutex;

/// Shared handles threaded through every HTTP handler and the background
/// pipeline driver. `db` is behind a `tokio::sync::Mutex` because
/// `rusqlite::Connection` is `Send` but not `Sync` — one connection, async
/// callers take turns (§5's "Session row is the serialisation point").
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub scheduler: SchedulerContext,
    pub events: EventBus,
    pub config: Arc<confide_config::Config>,
    /// One coalescer shared by every session's pipeline task, keyed by
    /// patient id, so a burst of sessions finishing Wave 2 together
    /// produces a single Wave-3 regeneration (§4.6).
    pub wave3_debounce: DebounceCoalescer,
}

impl AppState {
    pub fn new(db: Database, scheduler: SchedulerContext, config: Arc<confide_config::Config>) -> Self {
        let db = Arc::new(Mutex::new(db));
        let events = EventBus::new(db.clone());
        Self {
            db,
            scheduler,
            events,
            config,
            wave3_debounce: DebounceCoalescer::new(),
        }
    }
}
