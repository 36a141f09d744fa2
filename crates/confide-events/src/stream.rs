// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use confide_core::types::PipelineEvent;
use confide_scheduler::CancelToken;
use futures::stream::{self, Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::bus::EventBus;

/// One frame of a patient's SSE stream. `KeepAlive` carries no event data —
/// it exists only so intermediate proxies don't time out an idle connection.
#[derive(Debug, Clone)]
pub enum SseFrame {
    Event(PipelineEvent),
    KeepAlive,
}

/// Builds one patient's event stream: everything since `watermark` first
/// (durable catch-up — covers a client reconnecting with `Last-Event-ID`),
/// then live broadcast delivery interleaved with keep-alive frames, until
/// `cancel` fires (subscriber disconnect, §4.9).
pub fn subscribe_patient(
    bus: &EventBus,
    patient_id: String,
    watermark: i64,
    keepalive: Duration,
    cancel: CancelToken,
) -> impl Stream<Item = SseFrame> {
    let store = bus.store();

    let catch_up = stream::once({
        let patient_id = patient_id.clone();
        async move {
            let db = store.lock().await;
            db.events_since(&patient_id, watermark).unwrap_or_default()
        }
    })
    .flat_map(|events| stream::iter(events.into_iter().map(SseFrame::Event)));

    let live = BroadcastStream::new(bus.subscribe()).filter_map({
        let patient_id = patient_id.clone();
        move |item| {
            let patient_id = patient_id.clone();
            async move {
                match item {
                    Ok(event) if event.patient_id == patient_id => Some(SseFrame::Event(event)),
                    // A lagged receiver or a different patient's event: the next
                    // catch-up-capable reconnect (not this stream) is the recovery path.
                    _ => None,
                }
            }
        }
    });

    let keepalive_ticks = stream::unfold((), move |_| async move {
        tokio::time::sleep(keepalive).await;
        Some((SseFrame::KeepAlive, ()))
    });

    let live_and_keepalive = stream::select(live, keepalive_ticks);

    catch_up.chain(live_and_keepalive).take_while(move |_| {
        let cancel = cancel.clone();
        async move { !cancel.is_cancelled() }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use confide_core::types::Phase;
    use confide_store::Database;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn bus() -> EventBus {
        let db = Database::open_in_memory().unwrap();
        EventBus::new(Arc::new(Mutex::new(db)))
    }

    fn publish_args(patient_id: &str) -> crate::bus::NewEvent {
        crate::bus::NewEvent {
            patient_id: patient_id.into(),
            phase: Phase::Wave1,
            event_type: "t".into(),
            session_id: None,
            status: "ok".into(),
            details: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn catch_up_replays_persisted_events_before_live_ones() {
        let bus = bus();
        bus.publish(publish_args("p1")).await;

        let cancel = CancelToken::new();
        let s = subscribe_patient(&bus, "p1".into(), 0, Duration::from_secs(30), cancel.clone());
        tokio::pin!(s);

        match s.next().await.unwrap() {
            SseFrame::Event(e) => assert_eq!(e.patient_id, "p1"),
            SseFrame::KeepAlive => panic!("expected a catch-up event first"),
        }
        cancel.cancel();
    }

    #[tokio::test]
    async fn stream_ignores_other_patients_live_events() {
        let bus = bus();
        let cancel = CancelToken::new();
        let s = subscribe_patient(&bus, "p1".into(), 0, Duration::from_millis(20), cancel.clone());
        tokio::pin!(s);

        bus.publish(publish_args("other-patient")).await;

        // Only keep-alive frames should surface; the other patient's event is filtered out.
        match s.next().await.unwrap() {
            SseFrame::KeepAlive => {}
            SseFrame::Event(_) => panic!("must not leak another patient's event"),
        }
        cancel.cancel();
    }
}
