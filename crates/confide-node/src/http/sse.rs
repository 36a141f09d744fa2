// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `GET /sse/events/{patient_id}` (§6). Wire format per event: `event:
//! <PHASE>` then `data: {type, session_id?, status, timestamp, payload}`,
//! blank line — axum's [`Event`] builder emits exactly that shape.

use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use confide_core::types::Phase;
use confide_events::SseFrame;
use confide_scheduler::CancelToken;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SseQuery {
    #[serde(default)]
    pub since_id: i64,
}

pub async fn stream_patient_events(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
    Query(query): Query<SseQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Dropped with the connection; `subscribe_patient`'s own keep-alive
    // ticks keep the stream alive without this token ever being cancelled
    // from the outside — a disconnect is observed by the stream simply
    // being dropped, which axum does for us.
    let cancel = CancelToken::new();
    let keepalive = state.config.sse_keepalive();

    let frames = confide_events::subscribe_patient(&state.events, patient_id, query.since_id, keepalive, cancel);
    let events = frames.map(|frame| Ok(frame_to_event(frame)));

    Sse::new(events).keep_alive(KeepAlive::new().interval(keepalive))
}

fn frame_to_event(frame: SseFrame) -> Event {
    match frame {
        SseFrame::KeepAlive => Event::default().comment(""),
        SseFrame::Event(event) => {
            let body = serde_json::json!({
                "type": event.event_type,
                "session_id": event.session_id,
                "status": event.status,
                "timestamp": event.created_at.to_rfc3339(),
                "payload": event.details,
            });
            let phase = phase_name(event.phase);
            match Event::default().event(phase).id(event.id.to_string()).json_data(body) {
                Ok(e) => e,
                Err(err) => {
                    tracing::error!(error = %err, "failed to serialize pipeline event for SSE");
                    Event::default().event(phase)
                }
            }
        }
    }
}

fn phase_name(phase: Phase) -> &'static str {
    match phase {
        Phase::Transcript => "TRANSCRIPT",
        Phase::Wave1 => "WAVE1",
        Phase::Wave2 => "WAVE2",
        Phase::Wave3 => "WAVE3",
    }
}
