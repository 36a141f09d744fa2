// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use chrono::Utc;
use confide_core::types::{Phase, PipelineEvent};
use confide_store::Database;
use tokio::sync::{broadcast, Mutex};

const BROADCAST_CAPACITY: usize = 1024;

/// An event not yet persisted — `id`/`created_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub patient_id: String,
    pub phase: Phase,
    pub event_type: String,
    pub session_id: Option<String>,
    pub status: String,
    pub details: serde_json::Value,
}

/// Durable, fanned-out pipeline event delivery (§4.7). Every publish is
/// persisted through `confide-store` first so a subscriber that reconnects
/// later can catch up via [`confide_store::Database::events_since`]; the
/// in-process broadcast channel exists only to deliver already-persisted
/// events to live subscribers without waiting on the next poll tick.
#[derive(Clone)]
pub struct EventBus {
    store: Arc<Mutex<Database>>,
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(store: Arc<Mutex<Database>>) -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self { store, tx }
    }

    /// Persists and broadcasts `event`. Persistence failure is logged and
    /// swallowed — a dropped progress notification must never abort the
    /// pipeline stage that produced it.
    pub async fn publish(&self, event: NewEvent) {
        let record = PipelineEvent {
            id: 0,
            patient_id: event.patient_id.clone(),
            phase: event.phase,
            event_type: event.event_type,
            session_id: event.session_id,
            status: event.status,
            details: event.details,
            created_at: Utc::now(),
            consumed: false,
        };

        let persisted = {
            let db = self.store.lock().await;
            db.append_event(&record)
        };

        match persisted {
            Ok(id) => {
                let mut stored = record;
                stored.id = id;
                // No subscribers is the common case between SSE connections; not an error.
                let _ = self.tx.send(stored);
            }
            Err(err) => {
                tracing::error!(patient_id = %event.patient_id, error = %err, "failed to persist pipeline event, dropping it");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn store(&self) -> Arc<Mutex<Database>> {
        self.store.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> EventBus {
        let db = Database::open_in_memory().unwrap();
        EventBus::new(Arc::new(Mutex::new(db)))
    }

    fn sample(patient_id: &str) -> NewEvent {
        NewEvent {
            patient_id: patient_id.into(),
            phase: Phase::Wave1,
            event_type: "wave_completed".into(),
            session_id: Some("s1".into()),
            status: "ok".into(),
            details: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn publish_persists_and_assigns_an_id() {
        let bus = bus();
        bus.publish(sample("p1")).await;

        let store = bus.store();
        let db = store.lock().await;
        let events = db.events_since("p1", 0).unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].id > 0);
    }

    #[tokio::test]
    async fn subscribers_receive_published_events_live() {
        let bus = bus();
        let mut rx = bus.subscribe();

        bus.publish(sample("p1")).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.patient_id, "p1");
        assert_eq!(received.event_type, "wave_completed");
    }

    #[tokio::test]
    async fn subscribers_with_no_receiver_do_not_block_publish() {
        let bus = bus();
        bus.publish(sample("p1")).await;
        bus.publish(sample("p1")).await;

        let store = bus.store();
        let db = store.lock().await;
        assert_eq!(db.events_since("p1", 0).unwrap().len(), 2);
    }
}
