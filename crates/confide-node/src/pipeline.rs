// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Background orchestration: ingest unlocks Wave 1, Wave 1 success unlocks
//! Wave 2, and every Wave-2 completion schedules a debounced Wave-3
//! regeneration for the whole patient (§4.5, §4.6's coalescing rule).
//!
//! Handlers in `http::routes` only persist the inbound request and
//! `tokio::spawn` [`process_session`]; the HTTP response never waits on a
//! generator call (§6's "ingest is fire-and-forget").

use chrono::Utc;
use confide_compaction::{compact, CompactionInput, PriorSessionData};
use confide_core::types::{Phase, ProcessingStatus, Session, Wave1Fields, Wave2Fields};
use confide_events::NewEvent;
use confide_model::CostEntry;
use confide_scheduler::{run_wave1, run_wave2, run_wave3, Wave1Input, Wave2Input, Wave3Input};
use confide_store::GenerationCostRow;

use crate::state::AppState;

const WAVE1: &str = "wave1";
const WAVE2: &str = "wave2";

/// Drives one session through whichever stages it still needs, picking up
/// from its persisted state so it is safe to call repeatedly — once from
/// `/ingest/session` for a brand new session, again from `/patients/{id}
/// /resume` for one stalled between Wave 1 and Wave 2 (§4.9).
pub async fn process_session(state: AppState, session_id: String) {
    let session = match load_session(&state, &session_id).await {
        Some(s) => s,
        None => return,
    };

    if session.wave1.wave1_completed_at.is_none() {
        if state.scheduler.cancellation.is_stopped(&session.patient_id) {
            return;
        }
        run_wave1_stage(&state, &session).await;
    }

    let session = match load_session(&state, &session_id).await {
        Some(s) => s,
        None => return,
    };

    if !session.wave2_eligible() || session.wave2.deep_analyzed_at.is_some() {
        return;
    }
    if state.scheduler.cancellation.is_stopped(&session.patient_id) {
        return;
    }
    if !earlier_sessions_have_completed_wave1(&state, &session).await {
        return;
    }

    run_wave2_stage(&state, &session).await;
    schedule_wave3(&state, session.patient_id);
}

async fn load_session(state: &AppState, session_id: &str) -> Option<Session> {
    let db = state.db.lock().await;
    match db.get_session(session_id) {
        Ok(Some(s)) => Some(s),
        Ok(None) => {
            tracing::error!(session_id, "session vanished mid-pipeline");
            None
        }
        Err(err) => {
            tracing::error!(session_id, error = %err, "failed to load session for processing");
            None
        }
    }
}

/// Wave-2 for a session waits until Wave-1 of every earlier session of the
/// same patient has finished (§4.5's cross-session ordering invariant) —
/// checked against freshly loaded sibling rows rather than `session`, since
/// their Wave-1 state may have changed since it was loaded.
async fn earlier_sessions_have_completed_wave1(state: &AppState, session: &Session) -> bool {
    let siblings = {
        let db = state.db.lock().await;
        db.sessions_for_patient(&session.patient_id).unwrap_or_default()
    };
    siblings
        .iter()
        .filter(|s| s.id != session.id && s.session_date < session.session_date)
        .all(|s| s.wave1.wave1_completed_at.is_some())
}

async fn run_wave1_stage(state: &AppState, session: &Session) {
    let log_id = {
        let db = state.db.lock().await;
        let _ = db.update_processing_status(&session.id, ProcessingStatus::Running);
        db.log_start(&session.id, WAVE1).ok()
    };
    publish(state, &session.patient_id, Phase::Wave1, "wave1_started", Some(&session.id), "running").await;

    let outcome = run_wave1(
        &state.scheduler,
        Wave1Input {
            session_id: session.id.clone(),
            patient_id: session.patient_id.clone(),
            transcript: session.transcript.clone(),
        },
    )
    .await;

    record_costs(state, &outcome.costs).await;

    let wave1_completed = outcome.wave1_completed;
    let fields = merge_wave1_fields(&outcome);
    {
        let db = state.db.lock().await;
        if let Err(err) = db.update_wave1(&session.id, &fields) {
            tracing::error!(session_id = %session.id, error = %err, "failed to persist wave 1 results");
        }
        let status = if wave1_completed { ProcessingStatus::Running } else { ProcessingStatus::Failed };
        let _ = db.update_processing_status(&session.id, status);
        if !wave1_completed {
            let _ = db.update_analysis_status(&session.id, ProcessingStatus::Failed);
        }
        // A stop() in the meantime already marked this log row `stopped`;
        // don't clobber that with a late completed/failed transition.
        if !state.scheduler.cancellation.is_stopped(&session.patient_id) {
            finish_log(&db, log_id, wave1_completed, "wave 1 did not complete");
        }
    }

    let event_type = if wave1_completed { "wave1_completed" } else { "wave1_failed" };
    let status = if wave1_completed { "completed" } else { "failed" };
    publish(state, &session.patient_id, Phase::Wave1, event_type, Some(&session.id), status).await;
}

async fn run_wave2_stage(state: &AppState, session: &Session) {
    let log_id = { state.db.lock().await.log_start(&session.id, WAVE2).ok() };
    publish(state, &session.patient_id, Phase::Wave2, "wave2_started", Some(&session.id), "running").await;

    let prior_context = build_prior_context(state, &session.patient_id, Some(&session.id)).await;

    let outcome = run_wave2(
        &state.scheduler,
        Wave2Input {
            session_id: session.id.clone(),
            patient_id: session.patient_id.clone(),
            transcript: session.transcript.clone(),
            topics: session.wave1.topics.clone(),
            mood_score: session.wave1.mood_score,
            has_breakthrough: session.wave1.has_breakthrough.unwrap_or(false),
            prior_context: Some(prior_context),
        },
    )
    .await;

    record_costs(state, &outcome.costs).await;

    let completed = outcome.deep_analysis.is_some();
    let fields = merge_wave2_fields(&outcome);
    {
        let db = state.db.lock().await;
        if let Err(err) = db.update_wave2(&session.id, &fields) {
            tracing::error!(session_id = %session.id, error = %err, "failed to persist wave 2 results");
        }
        let terminal = if completed { ProcessingStatus::Completed } else { ProcessingStatus::Failed };
        let _ = db.update_processing_status(&session.id, terminal);
        let _ = db.update_analysis_status(&session.id, terminal);
        if !state.scheduler.cancellation.is_stopped(&session.patient_id) {
            finish_log(&db, log_id, completed, "wave 2 did not complete");
        }
    }

    let event_type = if completed { "wave2_completed" } else { "wave2_failed" };
    let status = if completed { "completed" } else { "failed" };
    publish(state, &session.patient_id, Phase::Wave2, event_type, Some(&session.id), status).await;
}

/// Debounced so a patient with several sessions finishing Wave 2 close
/// together gets one Journey/Bridge regeneration, not one per session.
fn schedule_wave3(state: &AppState, patient_id: String) {
    let state = state.clone();
    let debounce = state.config.debounce();
    let run_state = state.clone();
    state.wave3_debounce.schedule(patient_id.clone(), debounce, move || async move {
        run_wave3_now(run_state, patient_id).await;
    });
}

async fn run_wave3_now(state: AppState, patient_id: String) {
    let total_sessions = {
        let db = state.db.lock().await;
        db.count_sessions_for_patient(&patient_id).unwrap_or(0)
    };

    let context = build_prior_context(&state, &patient_id, None).await;
    let strategy_name = state.config.compaction_strategy.to_string();

    publish(&state, &patient_id, Phase::Wave3, "wave3_started", None, "running").await;

    let outcome = run_wave3(
        &state.scheduler,
        Wave3Input { patient_id: patient_id.clone(), context, total_sessions },
    )
    .await;

    record_costs(&state, &outcome.costs).await;

    let model_used = outcome.costs.first().map(|c| c.model.clone()).unwrap_or_else(|| "unknown".into());

    let mut wrote_any = false;
    if let Some(journey) = &outcome.journey {
        wrote_any = true;
        let version_id = uuid::Uuid::new_v4().to_string();
        let Ok(doc_json) = serde_json::to_string(journey) else {
            tracing::error!(patient_id = %patient_id, "failed to serialize journey doc");
            return;
        };
        let mut db = state.db.lock().await;
        match db.create_journey_version(&patient_id, &version_id, &doc_json) {
            Ok(_) => {
                let _ = db.create_metadata(
                    &uuid::Uuid::new_v4().to_string(),
                    Some(&version_id),
                    None,
                    total_sessions,
                    total_sessions,
                    &model_used,
                    Some(&strategy_name),
                    0,
                );
            }
            Err(err) => tracing::error!(patient_id = %patient_id, error = %err, "failed to persist journey version"),
        }
    }

    if let Some(bridge) = &outcome.bridge {
        wrote_any = true;
        let version_id = uuid::Uuid::new_v4().to_string();
        let Ok(doc_json) = serde_json::to_string(bridge) else {
            tracing::error!(patient_id = %patient_id, "failed to serialize bridge doc");
            return;
        };
        let mut db = state.db.lock().await;
        match db.create_bridge_version(&patient_id, &version_id, &doc_json) {
            Ok(_) => {
                let _ = db.create_metadata(
                    &uuid::Uuid::new_v4().to_string(),
                    None,
                    Some(&version_id),
                    total_sessions,
                    total_sessions,
                    &model_used,
                    Some(&strategy_name),
                    0,
                );
            }
            Err(err) => tracing::error!(patient_id = %patient_id, error = %err, "failed to persist bridge version"),
        }
    }

    let (event_type, status) = if wrote_any { ("wave3_completed", "completed") } else { ("wave3_failed", "failed") };
    state
        .events
        .publish(NewEvent {
            patient_id: patient_id.clone(),
            phase: Phase::Wave3,
            event_type: event_type.to_string(),
            session_id: None,
            status: status.to_string(),
            details: serde_json::json!({ "low_confidence": outcome.low_confidence }),
        })
        .await;
}

/// Builds the context compaction needs from every prior session on file,
/// most-recent-first, excluding `current_session_id` when Wave 2 is
/// building its own deep-analysis context (it has its own transcript).
async fn build_prior_context(
    state: &AppState,
    patient_id: &str,
    current_session_id: Option<&str>,
) -> confide_compaction::CompactedContext {
    let sessions = {
        let db = state.db.lock().await;
        db.sessions_for_patient(patient_id).unwrap_or_default()
    };

    let previous_journey_summary = {
        let db = state.db.lock().await;
        db.latest_journey_doc(patient_id)
            .ok()
            .flatten()
            .and_then(|raw| serde_json::from_str::<confide_core::types::JourneyDoc>(&raw).ok())
            .map(|doc| doc.summary)
    };

    let mut prior_sessions: Vec<PriorSessionData> = sessions
        .into_iter()
        .filter(|s| current_session_id.map(|id| id != s.id).unwrap_or(true))
        .map(session_to_prior_data)
        .collect();
    prior_sessions.reverse(); // sessions_for_patient is oldest-first; compaction wants newest-first

    let strategy: confide_compaction::CompactionStrategy = state.config.compaction_strategy.into();
    compact(strategy, &CompactionInput { prior_sessions, previous_journey_summary })
}

fn session_to_prior_data(session: Session) -> PriorSessionData {
    PriorSessionData {
        session_date: session.session_date.to_rfc3339(),
        mood_score: session.wave1.mood_score,
        topics: session.wave1.topics,
        summary: session.wave1.summary,
        has_breakthrough: session.wave1.has_breakthrough.unwrap_or(false),
        deep_analysis: session.wave2.deep_analysis,
        session_insights: None,
    }
}

fn merge_wave1_fields(outcome: &confide_scheduler::Wave1Outcome) -> Wave1Fields {
    let mut fields = Wave1Fields::default();
    let now = Utc::now();

    if let Some(mood) = &outcome.mood {
        fields.mood_score = Some(mood.score);
        fields.mood_confidence = Some(mood.confidence);
        fields.mood_rationale = Some(mood.rationale.clone());
        fields.mood_indicators = mood.key_indicators.clone();
        fields.emotional_tone = Some(mood.emotional_tone.clone());
        fields.mood_analyzed_at = Some(now);
    }

    if let Some(topics) = &outcome.topics {
        fields.topics = topics.topics.clone();
        fields.action_items = topics.action_items.clone();
        fields.technique = Some(topics.technique.clone());
        fields.summary = Some(topics.summary.clone());
        fields.topics_extracted_at = Some(now);
    }

    if let Some(breakthrough) = &outcome.breakthrough {
        fields.has_breakthrough = Some(breakthrough.has_breakthrough);
        // §3 invariant: breakthrough_data is null whenever has_breakthrough is false.
        if breakthrough.has_breakthrough {
            fields.breakthrough_label = breakthrough.label.clone();
            fields.breakthrough_data = serde_json::to_value(breakthrough).ok();
        }
    }

    if let Some(action_summary) = &outcome.action_summary {
        fields.action_items_summary = Some(action_summary.summary.clone());
    }

    if let Some(speaker_label) = &outcome.speaker_label {
        fields.speaker_labels = speaker_label.labels.clone();
        fields.speaker_label_confidence = Some(speaker_label.confidence);
        fields.speaker_labeled_at = Some(now);
    }

    if outcome.wave1_completed {
        fields.wave1_completed_at = Some(now);
    }

    fields
}

fn merge_wave2_fields(outcome: &confide_scheduler::Wave2Outcome) -> Wave2Fields {
    let mut fields = Wave2Fields::default();
    let now = Utc::now();

    if let Some(analysis) = &outcome.deep_analysis {
        fields.analysis_confidence = Some(analysis.confidence);
        fields.deep_analysis = serde_json::to_value(analysis).ok();
        fields.deep_analyzed_at = Some(now);
    }

    if let Some(prose) = &outcome.prose {
        fields.prose_analysis = Some(prose.prose_analysis.clone());
        fields.prose_generated_at = Some(now);
    }

    fields
}

/// Closes out a `processing_log` row opened by [`confide_store::Database::log_start`],
/// skipped entirely when `log_start` itself failed to insert (`log_id` is `None`).
fn finish_log(db: &confide_store::Database, log_id: Option<i64>, success: bool, fail_msg: &str) {
    let Some(id) = log_id else { return };
    let result = if success { db.log_complete(id) } else { db.log_fail(id, fail_msg) };
    if let Err(err) = result {
        tracing::warn!(log_id = id, error = %err, "failed to close out processing_log row");
    }
}

async fn record_costs(state: &AppState, costs: &[CostEntry]) {
    if costs.is_empty() {
        return;
    }
    let db = state.db.lock().await;
    for cost in costs {
        let row = GenerationCostRow {
            task: cost.task.clone(),
            model: cost.model.clone(),
            input_tokens: cost.input_tokens,
            output_tokens: cost.output_tokens,
            cost_usd: cost.cost_usd,
            duration_ms: cost.duration_ms,
            session_id: cost.session_id.clone(),
            patient_id: cost.patient_id.clone(),
        };
        if let Err(err) = db.record_cost(&row) {
            tracing::warn!(task = %cost.task, error = %err, "failed to record generation cost");
        }
    }
}

async fn publish(
    state: &AppState,
    patient_id: &str,
    phase: Phase,
    event_type: &str,
    session_id: Option<&str>,
    status: &str,
) {
    state
        .events
        .publish(NewEvent {
            patient_id: patient_id.to_string(),
            phase,
            event_type: event_type.to_string(),
            session_id: session_id.map(|s| s.to_string()),
            status: status.to_string(),
            details: serde_json::json!({}),
        })
        .await;
}
