// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod routes;
mod sse;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Per-request timeout for the REST surface. SSE connections are exempt —
/// they are long-lived by design — so this layer only wraps the routes
/// below it, not the whole router.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

pub fn router(state: AppState) -> Router {
    let rest = Router::new()
        .route("/ingest/session", post(routes::ingest_session))
        .route("/sessions/:id", get(routes::get_session))
        .route("/patients/:id/sessions", get(routes::list_sessions))
        .route("/patients/:id/journey", get(routes::get_journey))
        .route("/patients/:id/bridge", get(routes::get_bridge))
        .route("/patients/:id/status", get(routes::patient_status))
        .route("/patients/:id/stop", post(routes::stop_patient))
        .route("/patients/:id/resume", post(routes::resume_patient))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    let sse = Router::new().route("/sse/events/:patient_id", get(sse::stream_patient_events));

    rest.merge(sse).layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state)
}
