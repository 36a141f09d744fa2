// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The eight REST endpoints (§6). Every handler is a thin translation
//! layer: validate, touch the store, `tokio::spawn` the pipeline where a
//! write unlocks background work, and respond — generation itself never
//! runs on the request path.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use confide_core::types::{ProcessingStatus, Session, TranscriptSegment, Wave1Fields, Wave2Fields};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::pipeline;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IngestSessionRequest {
    pub patient_id: String,
    pub session_date: DateTime<Utc>,
    pub duration_minutes: u32,
    pub transcript: Vec<TranscriptSegment>,
}

#[derive(Debug, Serialize)]
pub struct IngestSessionResponse {
    pub session_id: String,
}

pub async fn ingest_session(
    State(state): State<AppState>,
    Json(body): Json<IngestSessionRequest>,
) -> Result<(StatusCode, Json<IngestSessionResponse>), ApiError> {
    if body.transcript.is_empty() {
        return Err(ApiError::BadRequest("transcript must have at least one segment".into()));
    }
    if let Some(bad) = body.transcript.iter().find(|seg| !seg.is_valid()) {
        return Err(ApiError::BadRequest(format!(
            "transcript segment has end_sec <= start_sec: {:?}",
            bad
        )));
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    let session = Session {
        id: session_id.clone(),
        patient_id: body.patient_id,
        session_date: body.session_date,
        duration_minutes: body.duration_minutes,
        transcript: body.transcript,
        processing_status: ProcessingStatus::Pending,
        analysis_status: ProcessingStatus::Pending,
        wave1: Wave1Fields::default(),
        wave2: Wave2Fields::default(),
    };

    {
        let db = state.db.lock().await;
        db.create_session(&session)?;
    }

    tokio::spawn(pipeline::process_session(state, session_id.clone()));

    Ok((StatusCode::ACCEPTED, Json(IngestSessionResponse { session_id })))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let db = state.db.lock().await;
    let session = db.get_session(&session_id)?.ok_or_else(|| ApiError::NotFound(session_id.clone()))?;
    Ok(Json(session))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> Result<Json<Vec<Session>>, ApiError> {
    let db = state.db.lock().await;
    Ok(Json(db.sessions_for_patient(&patient_id)?))
}

pub async fn get_journey(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let db = state.db.lock().await;
    let raw = db.latest_journey_doc(&patient_id)?.ok_or_else(|| ApiError::NotFound(format!("no journey for {patient_id}")))?;
    let doc: serde_json::Value = serde_json::from_str(&raw).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(doc))
}

pub async fn get_bridge(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let db = state.db.lock().await;
    let raw = db.latest_bridge_doc(&patient_id)?.ok_or_else(|| ApiError::NotFound(format!("no bridge for {patient_id}")))?;
    let doc: serde_json::Value = serde_json::from_str(&raw).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(doc))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    NotStarted,
    Running,
    Stopped,
    Complete,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub analysis_status: AnalysisStatus,
    pub wave1_complete_count: u32,
    pub wave2_complete_count: u32,
    pub roadmap_updated_at: Option<DateTime<Utc>>,
    pub processing_state: String,
    pub stopped_at_session_id: Option<String>,
    pub can_resume: bool,
}

/// §4.9's `status(patient_id)`, derived by joining session timestamps with
/// the in-flight process set rather than stored as its own row.
pub async fn patient_status(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let (sessions, running, roadmap_updated_at) = {
        let db = state.db.lock().await;
        (
            db.sessions_for_patient(&patient_id)?,
            db.running_waves_for_patient(&patient_id)?,
            db.latest_journey_updated_at(&patient_id)?,
        )
    };

    let wave1_complete_count = sessions.iter().filter(|s| s.wave1.wave1_completed_at.is_some()).count() as u32;
    let wave2_complete_count = sessions.iter().filter(|s| s.wave2.deep_analyzed_at.is_some()).count() as u32;

    let is_stopped = state.scheduler.cancellation.is_stopped(&patient_id);
    let all_wave2_done = !sessions.is_empty() && wave2_complete_count as usize == sessions.len();
    let all_wave1_done = !sessions.is_empty() && wave1_complete_count as usize == sessions.len();

    let (analysis_status, processing_state) = if sessions.is_empty() {
        (AnalysisStatus::NotStarted, "not_started")
    } else if is_stopped {
        (AnalysisStatus::Stopped, "stopped")
    } else if all_wave2_done && roadmap_updated_at.is_some() {
        (AnalysisStatus::Complete, "complete")
    } else {
        (AnalysisStatus::Running, "running")
    };
    let _ = all_wave1_done; // surfaced through wave1_complete_count, not a separate state

    let stopped_at_session_id = if is_stopped { running.first().map(|r| r.session_id.clone()) } else { None };

    Ok(Json(StatusResponse {
        analysis_status,
        wave1_complete_count,
        wave2_complete_count,
        roadmap_updated_at,
        processing_state: processing_state.to_string(),
        stopped_at_session_id,
        can_resume: is_stopped,
    }))
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub aborted: Vec<AbortedTask>,
}

#[derive(Debug, Serialize)]
pub struct AbortedTask {
    pub session_id: String,
    pub wave: String,
}

/// §4.9's `stop(patient_id)`: cancels the patient's token (every in-flight
/// `run_generator` call races this and returns within its own select, no
/// explicit 5s wait needed here) and marks the running log rows `stopped`.
/// Idempotent: calling it again on an already-stopped patient just returns
/// an empty `aborted` list.
pub async fn stop_patient(State(state): State<AppState>, Path(patient_id): Path<String>) -> Result<Json<StopResponse>, ApiError> {
    state.scheduler.cancellation.stop(&patient_id);

    let aborted = {
        let db = state.db.lock().await;
        db.stop_running_waves_for_patient(&patient_id)?
    };

    Ok(Json(StopResponse {
        aborted: aborted.into_iter().map(|r| AbortedTask { session_id: r.session_id, wave: r.wave }).collect(),
    }))
}

#[derive(Debug, Serialize)]
pub struct ResumeResponse {
    pub resumed_session_id: Option<String>,
    pub queued_session_ids: Vec<String>,
}

/// §4.9's `resume(patient_id)`: finds the first session whose Wave-1
/// completed but Wave-2 did not and re-enters the pipeline driver for it
/// (which re-derives eligibility from the stored session and runs only the
/// stages still missing), then does the same for every other session that
/// never reached a terminal status. Idempotent: nothing eligible just
/// clears the stop flag.
pub async fn resume_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> Result<Json<ResumeResponse>, ApiError> {
    state.scheduler.cancellation.resume(&patient_id);

    let sessions = {
        let db = state.db.lock().await;
        db.sessions_for_patient(&patient_id)?
    };

    let resumed_session_id = sessions
        .iter()
        .find(|s| s.wave2_eligible() && s.wave2.deep_analyzed_at.is_none())
        .map(|s| s.id.clone());

    let is_terminal = |status: ProcessingStatus| matches!(status, ProcessingStatus::Completed | ProcessingStatus::Failed);
    let queued_session_ids: Vec<String> = sessions
        .iter()
        .filter(|s| !is_terminal(s.processing_status) && Some(&s.id) != resumed_session_id.as_ref())
        .map(|s| s.id.clone())
        .collect();

    if let Some(session_id) = &resumed_session_id {
        tokio::spawn(pipeline::process_session(state.clone(), session_id.clone()));
    }
    for session_id in &queued_session_ids {
        tokio::spawn(pipeline::process_session(state.clone(), session_id.clone()));
    }

    Ok(Json(ResumeResponse { resumed_session_id, queued_session_ids }))
}
