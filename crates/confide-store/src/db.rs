// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;

use chrono::Utc;
use confide_core::types::{
    Phase, PipelineEvent, ProcessingStatus, Session, TranscriptSegment, Wave1Fields, Wave2Fields,
};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;
use crate::schema::init_schema;

pub struct Database {
    conn: Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

impl WaveStatus {
    fn as_str(&self) -> &'static str {
        match self {
            WaveStatus::Running => "running",
            WaveStatus::Completed => "completed",
            WaveStatus::Failed => "failed",
            WaveStatus::Stopped => "stopped",
        }
    }
}

/// One row of `processing_log`, as reported to the stop/resume API (§4.9).
#[derive(Debug, Clone)]
pub struct RunningWave {
    pub log_id: i64,
    pub session_id: String,
    pub wave: String,
}

#[derive(Debug, Clone)]
pub struct GenerationCostRow {
    pub task: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub duration_ms: u64,
    pub session_id: Option<String>,
    pub patient_id: Option<String>,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        let db = Self { conn };
        init_schema(&db.conn)?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        init_schema(&db.conn)?;
        Ok(db)
    }

    // --- patients / sessions (C2) ---

    pub fn ensure_patient(&self, patient_id: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO patients (id, created_at) VALUES (?1, ?2) ON CONFLICT(id) DO NOTHING",
            params![patient_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        self.ensure_patient(&session.patient_id)?;
        self.conn.execute(
            "INSERT INTO sessions
                (id, patient_id, session_date, duration_minutes, transcript_json,
                 processing_status, analysis_status, wave1_json, wave2_json, wave1_completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                session.id,
                session.patient_id,
                session.session_date.to_rfc3339(),
                session.duration_minutes as i64,
                serde_json::to_string(&session.transcript)?,
                status_as_str(session.processing_status),
                status_as_str(session.analysis_status),
                serde_json::to_string(&session.wave1)?,
                serde_json::to_string(&session.wave2)?,
                session.wave1.wave1_completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, patient_id, session_date, duration_minutes, transcript_json,
                        processing_status, analysis_status, wave1_json, wave2_json
                 FROM sessions WHERE id = ?1",
                [session_id],
                row_to_session,
            )
            .optional()
            .map_err(StoreError::from)
    }

    /// Oldest first — the order compaction and Journey/Bridge regeneration
    /// expect prior sessions in (§4.4).
    pub fn sessions_for_patient(&self, patient_id: &str) -> Result<Vec<Session>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, patient_id, session_date, duration_minutes, transcript_json,
                    processing_status, analysis_status, wave1_json, wave2_json
             FROM sessions WHERE patient_id = ?1 ORDER BY session_date ASC",
        )?;
        let rows = stmt.query_map([patient_id], row_to_session)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_sessions_for_patient(&self, patient_id: &str) -> Result<u32, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE patient_id = ?1",
            [patient_id],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    pub fn update_processing_status(&self, session_id: &str, status: ProcessingStatus) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE sessions SET processing_status = ?1 WHERE id = ?2",
            params![status_as_str(status), session_id],
        )?;
        Ok(())
    }

    pub fn update_analysis_status(&self, session_id: &str, status: ProcessingStatus) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE sessions SET analysis_status = ?1 WHERE id = ?2",
            params![status_as_str(status), session_id],
        )?;
        Ok(())
    }

    pub fn update_wave1(&self, session_id: &str, wave1: &Wave1Fields) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE sessions SET wave1_json = ?1, wave1_completed_at = ?2 WHERE id = ?3",
            params![
                serde_json::to_string(wave1)?,
                wave1.wave1_completed_at.map(|t| t.to_rfc3339()),
                session_id,
            ],
        )?;
        Ok(())
    }

    pub fn update_wave2(&self, session_id: &str, wave2: &Wave2Fields) -> Result<(), StoreError> {
        self.conn
            .execute("UPDATE sessions SET wave2_json = ?1 WHERE id = ?2", params![serde_json::to_string(wave2)?, session_id])?;
        Ok(())
    }

    // --- processing_log (C6) ---

    pub fn log_start(&self, session_id: &str, wave: &str) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO processing_log (session_id, wave, status, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, wave, WaveStatus::Running.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn log_complete(&self, log_id: i64) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE processing_log SET status = ?1, completed_at = ?2 WHERE id = ?3",
            params![WaveStatus::Completed.as_str(), Utc::now().to_rfc3339(), log_id],
        )?;
        Ok(())
    }

    pub fn log_fail(&self, log_id: i64, error: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE processing_log SET status = ?1, completed_at = ?2, error = ?3 WHERE id = ?4",
            params![WaveStatus::Failed.as_str(), Utc::now().to_rfc3339(), error, log_id],
        )?;
        Ok(())
    }

    pub fn is_wave_complete(&self, session_id: &str, wave: &str) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM processing_log WHERE session_id = ?1 AND wave = ?2 AND status = ?3",
            params![session_id, wave, WaveStatus::Completed.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// All `(session, wave)` pairs currently `running` for a patient — what
    /// `stop(patient_id)` must mark `stopped` (§4.9).
    pub fn running_waves_for_patient(&self, patient_id: &str) -> Result<Vec<RunningWave>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT pl.id, pl.session_id, pl.wave FROM processing_log pl
             JOIN sessions s ON s.id = pl.session_id
             WHERE s.patient_id = ?1 AND pl.status = ?2",
        )?;
        let rows = stmt
            .query_map(params![patient_id, WaveStatus::Running.as_str()], |row| {
                Ok(RunningWave { log_id: row.get(0)?, session_id: row.get(1)?, wave: row.get(2)? })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Marks every currently-running `(session, wave)` row for a patient as
    /// `stopped` and returns what was aborted, for `stop(patient_id)`'s
    /// response body (§4.9).
    pub fn stop_running_waves_for_patient(&self, patient_id: &str) -> Result<Vec<RunningWave>, StoreError> {
        let running = self.running_waves_for_patient(patient_id)?;
        for row in &running {
            self.conn.execute(
                "UPDATE processing_log SET status = ?1, completed_at = ?2 WHERE id = ?3",
                params![WaveStatus::Stopped.as_str(), Utc::now().to_rfc3339(), row.log_id],
            )?;
        }
        Ok(running)
    }

    /// The `created_at` of a patient's current Journey version, surfaced as
    /// `roadmap_updated_at` by the status endpoint (§4.9).
    pub fn latest_journey_updated_at(&self, patient_id: &str) -> Result<Option<chrono::DateTime<Utc>>, StoreError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT jv.created_at FROM journey_latest jl
                 JOIN journey_versions jv ON jv.id = jl.version_id
                 WHERE jl.patient_id = ?1",
                [patient_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok().map(|dt| dt.with_timezone(&Utc))))
    }

    // --- generation_cost (C2) ---

    pub fn record_cost(&self, cost: &GenerationCostRow) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO generation_cost
                (task, model, input_tokens, output_tokens, cost_usd, duration_ms, session_id, patient_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                cost.task,
                cost.model,
                cost.input_tokens,
                cost.output_tokens,
                cost.cost_usd,
                cost.duration_ms,
                cost.session_id,
                cost.patient_id,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn total_cost_for_patient(&self, patient_id: &str) -> Result<f64, StoreError> {
        let total: Option<f64> = self.conn.query_row(
            "SELECT SUM(cost_usd) FROM generation_cost WHERE patient_id = ?1",
            [patient_id],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0.0))
    }

    // --- journey / bridge version stores (C8, XOR invariant) ---

    /// Inserts a new journey version and repoints `journey_latest` in one
    /// transaction — readers never observe a version row without a latest
    /// pointer, or vice versa (§4.8).
    pub fn create_journey_version(
        &mut self,
        patient_id: &str,
        version_id: &str,
        doc_json: &str,
    ) -> Result<i64, StoreError> {
        let tx = self.conn.transaction()?;
        let next_version: i64 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM journey_versions WHERE patient_id = ?1",
            [patient_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO journey_versions (id, patient_id, version, doc_json, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![version_id, patient_id, next_version, doc_json, Utc::now().to_rfc3339()],
        )?;
        tx.execute(
            "INSERT INTO journey_latest (patient_id, version_id) VALUES (?1, ?2)
             ON CONFLICT(patient_id) DO UPDATE SET version_id = ?2",
            params![patient_id, version_id],
        )?;
        tx.commit()?;
        Ok(next_version)
    }

    pub fn create_bridge_version(
        &mut self,
        patient_id: &str,
        version_id: &str,
        doc_json: &str,
    ) -> Result<i64, StoreError> {
        let tx = self.conn.transaction()?;
        let next_version: i64 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM bridge_versions WHERE patient_id = ?1",
            [patient_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO bridge_versions (id, patient_id, version, doc_json, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![version_id, patient_id, next_version, doc_json, Utc::now().to_rfc3339()],
        )?;
        tx.execute(
            "INSERT INTO bridge_latest (patient_id, version_id) VALUES (?1, ?2)
             ON CONFLICT(patient_id) DO UPDATE SET version_id = ?2",
            params![patient_id, version_id],
        )?;
        tx.commit()?;
        Ok(next_version)
    }

    pub fn latest_journey_doc(&self, patient_id: &str) -> Result<Option<String>, StoreError> {
        self.conn
            .query_row(
                "SELECT jv.doc_json FROM journey_latest jl
                 JOIN journey_versions jv ON jv.id = jl.version_id
                 WHERE jl.patient_id = ?1",
                [patient_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
    }

    pub fn latest_bridge_doc(&self, patient_id: &str) -> Result<Option<String>, StoreError> {
        self.conn
            .query_row(
                "SELECT bv.doc_json FROM bridge_latest bl
                 JOIN bridge_versions bv ON bv.id = bl.version_id
                 WHERE bl.patient_id = ?1",
                [patient_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
    }

    // --- generation_metadata (XOR invariant) ---

    #[allow(clippy::too_many_arguments)]
    pub fn create_metadata(
        &self,
        id: &str,
        journey_version_id: Option<&str>,
        bridge_version_id: Option<&str>,
        sessions_analyzed: u32,
        total_sessions: u32,
        model_used: &str,
        compaction_strategy: Option<&str>,
        generation_duration_ms: u64,
    ) -> Result<(), StoreError> {
        if journey_version_id.is_some() == bridge_version_id.is_some() {
            return Err(StoreError::InvariantViolation(
                "generation_metadata must link exactly one of journey_version_id or bridge_version_id".into(),
            ));
        }
        self.conn.execute(
            "INSERT INTO generation_metadata
                (id, journey_version_id, bridge_version_id, sessions_analyzed, total_sessions,
                 model_used, compaction_strategy, generation_timestamp, generation_duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                journey_version_id,
                bridge_version_id,
                sessions_analyzed,
                total_sessions,
                model_used,
                compaction_strategy,
                Utc::now().to_rfc3339(),
                generation_duration_ms,
            ],
        )?;
        Ok(())
    }

    // --- pipeline_events (C7) ---

    pub fn append_event(&self, event: &PipelineEvent) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO pipeline_events
                (patient_id, phase, event_type, session_id, status, details_json, created_at, consumed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
            params![
                event.patient_id,
                phase_as_str(event.phase),
                event.event_type,
                event.session_id,
                event.status,
                serde_json::to_string(&event.details)?,
                event.created_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Events strictly newer than `watermark`, oldest first — the shape an
    /// SSE poll loop consumes (§4.7).
    pub fn events_since(&self, patient_id: &str, watermark: i64) -> Result<Vec<PipelineEvent>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, patient_id, phase, event_type, session_id, status, details_json, created_at, consumed
             FROM pipeline_events WHERE patient_id = ?1 AND id > ?2 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![patient_id, watermark], row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn mark_consumed(&self, event_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute("UPDATE pipeline_events SET consumed = 1 WHERE id = ?1", [event_id])?;
        Ok(())
    }

    /// Deletes events older than `ttl_hours`, returning the number removed
    /// (§6's `EVENT_SWEEP_TTL_HOURS`).
    pub fn sweep_events(&self, ttl_hours: u64) -> Result<usize, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::hours(ttl_hours as i64);
        let removed = self.conn.execute(
            "DELETE FROM pipeline_events WHERE created_at < ?1",
            [cutoff.to_rfc3339()],
        )?;
        Ok(removed)
    }
}

fn status_as_str(status: ProcessingStatus) -> &'static str {
    match status {
        ProcessingStatus::Pending => "pending",
        ProcessingStatus::Running => "running",
        ProcessingStatus::Completed => "completed",
        ProcessingStatus::Failed => "failed",
        ProcessingStatus::Stopped => "stopped",
    }
}

fn status_from_str(s: &str) -> Result<ProcessingStatus, StoreError> {
    match s {
        "pending" => Ok(ProcessingStatus::Pending),
        "running" => Ok(ProcessingStatus::Running),
        "completed" => Ok(ProcessingStatus::Completed),
        "failed" => Ok(ProcessingStatus::Failed),
        "stopped" => Ok(ProcessingStatus::Stopped),
        other => Err(StoreError::InvariantViolation(format!("unknown processing status {other:?}"))),
    }
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    let session_date: String = row.get(2)?;
    let duration_minutes: i64 = row.get(3)?;
    let transcript_json: String = row.get(4)?;
    let processing_status: String = row.get(5)?;
    let analysis_status: String = row.get(6)?;
    let wave1_json: Option<String> = row.get(7)?;
    let wave2_json: Option<String> = row.get(8)?;

    Ok(Session {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        session_date: chrono::DateTime::parse_from_rfc3339(&session_date)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        duration_minutes: duration_minutes as u32,
        transcript: serde_json::from_str::<Vec<TranscriptSegment>>(&transcript_json).unwrap_or_default(),
        processing_status: status_from_str(&processing_status).unwrap_or(ProcessingStatus::Pending),
        analysis_status: status_from_str(&analysis_status).unwrap_or(ProcessingStatus::Pending),
        wave1: wave1_json
            .and_then(|s| serde_json::from_str::<Wave1Fields>(&s).ok())
            .unwrap_or_default(),
        wave2: wave2_json
            .and_then(|s| serde_json::from_str::<Wave2Fields>(&s).ok())
            .unwrap_or_default(),
    })
}

fn phase_as_str(phase: Phase) -> &'static str {
    match phase {
        Phase::Transcript => "TRANSCRIPT",
        Phase::Wave1 => "WAVE1",
        Phase::Wave2 => "WAVE2",
        Phase::Wave3 => "WAVE3",
    }
}

fn phase_from_str(s: &str) -> Result<Phase, StoreError> {
    match s {
        "TRANSCRIPT" => Ok(Phase::Transcript),
        "WAVE1" => Ok(Phase::Wave1),
        "WAVE2" => Ok(Phase::Wave2),
        "WAVE3" => Ok(Phase::Wave3),
        other => Err(StoreError::InvariantViolation(format!("unknown phase {other:?}"))),
    }
}

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<PipelineEvent> {
    let phase_str: String = row.get(2)?;
    let details_str: String = row.get(6)?;
    let created_at_str: String = row.get(7)?;
    Ok(PipelineEvent {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        phase: phase_from_str(&phase_str).unwrap_or(Phase::Transcript),
        event_type: row.get(3)?,
        session_id: row.get(4)?,
        status: row.get(5)?,
        details: serde_json::from_str(&details_str).unwrap_or(serde_json::Value::Null),
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        consumed: row.get::<_, i64>(8)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use confide_core::types::Phase;

    fn sample_session(id: &str, patient_id: &str) -> Session {
        Session {
            id: id.into(),
            patient_id: patient_id.into(),
            session_date: Utc::now(),
            duration_minutes: 50,
            transcript: vec![TranscriptSegment {
                start_sec: 0.0,
                end_sec: 5.0,
                speaker_id: "S1".into(),
                text: "hello".into(),
            }],
            processing_status: ProcessingStatus::Pending,
            analysis_status: ProcessingStatus::Pending,
            wave1: Wave1Fields::default(),
            wave2: Wave2Fields::default(),
        }
    }

    #[test]
    fn create_session_round_trips_through_get_session() {
        let db = Database::open_in_memory().unwrap();
        db.create_session(&sample_session("s1", "p1")).unwrap();

        let fetched = db.get_session("s1").unwrap().unwrap();
        assert_eq!(fetched.patient_id, "p1");
        assert_eq!(fetched.transcript.len(), 1);
        assert_eq!(fetched.duration_minutes, 50);
    }

    #[test]
    fn get_session_returns_none_for_unknown_id() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_session("missing").unwrap().is_none());
    }

    #[test]
    fn sessions_for_patient_orders_oldest_first() {
        let db = Database::open_in_memory().unwrap();
        let mut earlier = sample_session("s1", "p1");
        earlier.session_date = Utc::now() - chrono::Duration::days(2);
        let mut later = sample_session("s2", "p1");
        later.session_date = Utc::now();

        db.create_session(&later).unwrap();
        db.create_session(&earlier).unwrap();

        let sessions = db.sessions_for_patient("p1").unwrap();
        assert_eq!(sessions.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), vec!["s1", "s2"]);
    }

    #[test]
    fn update_wave1_sets_json_and_completion_timestamp() {
        let db = Database::open_in_memory().unwrap();
        db.create_session(&sample_session("s1", "p1")).unwrap();

        let mut wave1 = Wave1Fields::default();
        wave1.topics = vec!["anxiety".into()];
        wave1.wave1_completed_at = Some(Utc::now());
        db.update_wave1("s1", &wave1).unwrap();

        let fetched = db.get_session("s1").unwrap().unwrap();
        assert_eq!(fetched.wave1.topics, vec!["anxiety".to_string()]);
        assert!(fetched.wave2_eligible());
    }

    #[test]
    fn count_sessions_for_patient_reflects_inserts() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.count_sessions_for_patient("p1").unwrap(), 0);
        db.create_session(&sample_session("s1", "p1")).unwrap();
        db.create_session(&sample_session("s2", "p1")).unwrap();
        assert_eq!(db.count_sessions_for_patient("p1").unwrap(), 2);
    }

    fn sample_event(patient_id: &str) -> PipelineEvent {
        PipelineEvent {
            id: 0,
            patient_id: patient_id.to_string(),
            phase: Phase::Wave1,
            event_type: "mood_completed".into(),
            session_id: Some("s1".into()),
            status: "completed".into(),
            details: serde_json::json!({"score": 7.0}),
            created_at: Utc::now(),
            consumed: false,
        }
    }

    #[test]
    fn wave_completion_is_false_until_logged_complete() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.is_wave_complete("s1", "mood").unwrap());

        let log_id = db.log_start("s1", "mood").unwrap();
        assert!(!db.is_wave_complete("s1", "mood").unwrap());

        db.log_complete(log_id).unwrap();
        assert!(db.is_wave_complete("s1", "mood").unwrap());
    }

    #[test]
    fn failed_wave_is_not_complete() {
        let db = Database::open_in_memory().unwrap();
        let log_id = db.log_start("s1", "topics").unwrap();
        db.log_fail(log_id, "timeout").unwrap();
        assert!(!db.is_wave_complete("s1", "topics").unwrap());
    }

    #[test]
    fn journey_versions_increase_monotonically_per_patient() {
        let mut db = Database::open_in_memory().unwrap();
        let v1 = db.create_journey_version("p1", "jv-1", "{}").unwrap();
        let v2 = db.create_journey_version("p1", "jv-2", "{}").unwrap();
        assert_eq!(v1, 1);
        assert_eq!(v2, 2);

        let latest = db.latest_journey_doc("p1").unwrap().unwrap();
        assert_eq!(latest, "{}");
    }

    #[test]
    fn journey_and_bridge_version_counters_are_independent_per_patient() {
        let mut db = Database::open_in_memory().unwrap();
        db.create_journey_version("p1", "jv-1", "{}").unwrap();
        let bridge_v1 = db.create_bridge_version("p1", "bv-1", "{}").unwrap();
        assert_eq!(bridge_v1, 1);
    }

    #[test]
    fn metadata_rejects_both_links_set() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .create_metadata("m1", Some("jv-1"), Some("bv-1"), 3, 3, "gpt-4o", None, 500)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation(_)));
    }

    #[test]
    fn metadata_rejects_neither_link_set() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .create_metadata("m1", None, None, 3, 3, "gpt-4o", None, 500)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation(_)));
    }

    #[test]
    fn metadata_accepts_exactly_one_link() {
        let db = Database::open_in_memory().unwrap();
        db.create_metadata("m1", Some("jv-1"), None, 3, 3, "gpt-4o", Some("hierarchical"), 500)
            .unwrap();
    }

    #[test]
    fn events_since_returns_strictly_newer_events_in_order() {
        let db = Database::open_in_memory().unwrap();
        let id1 = db.append_event(&sample_event("p1")).unwrap();
        let id2 = db.append_event(&sample_event("p1")).unwrap();

        let since_zero = db.events_since("p1", 0).unwrap();
        assert_eq!(since_zero.len(), 2);

        let since_first = db.events_since("p1", id1).unwrap();
        assert_eq!(since_first.len(), 1);
        assert_eq!(since_first[0].id, id2);
    }

    #[test]
    fn sweep_removes_events_older_than_ttl() {
        let db = Database::open_in_memory().unwrap();
        db.append_event(&sample_event("p1")).unwrap();
        // a zero-hour TTL treats everything already committed as stale.
        let removed = db.sweep_events(0).unwrap();
        assert_eq!(removed, 1);
        assert!(db.events_since("p1", 0).unwrap().is_empty());
    }

    #[test]
    fn cost_accumulates_per_patient() {
        let db = Database::open_in_memory().unwrap();
        db.record_cost(&GenerationCostRow {
            task: "mood".into(),
            model: "gpt-4o".into(),
            input_tokens: 100,
            output_tokens: 50,
            cost_usd: 0.001,
            duration_ms: 200,
            session_id: Some("s1".into()),
            patient_id: Some("p1".into()),
        })
        .unwrap();
        db.record_cost(&GenerationCostRow {
            task: "topics".into(),
            model: "gpt-4o".into(),
            input_tokens: 100,
            output_tokens: 50,
            cost_usd: 0.002,
            duration_ms: 200,
            session_id: Some("s1".into()),
            patient_id: Some("p1".into()),
        })
        .unwrap();
        let total = db.total_cost_for_patient("p1").unwrap();
        assert!((total - 0.003).abs() < 1e-9);
    }

    #[test]
    fn stop_running_waves_marks_them_stopped_and_returns_them() {
        let db = Database::open_in_memory().unwrap();
        db.create_session(&sample_session("s1", "p1")).unwrap();
        let log_id = db.log_start("s1", "deep").unwrap();

        let stopped = db.stop_running_waves_for_patient("p1").unwrap();
        assert_eq!(stopped.len(), 1);
        assert_eq!(stopped[0].log_id, log_id);
        assert_eq!(stopped[0].wave, "deep");
        assert!(db.running_waves_for_patient("p1").unwrap().is_empty());
    }

    #[test]
    fn running_waves_for_patient_ignores_other_patients() {
        let db = Database::open_in_memory().unwrap();
        db.create_session(&sample_session("s1", "p1")).unwrap();
        db.create_session(&sample_session("s2", "p2")).unwrap();
        db.log_start("s1", "mood").unwrap();
        db.log_start("s2", "mood").unwrap();

        let running = db.running_waves_for_patient("p1").unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].session_id, "s1");
    }

    #[test]
    fn latest_journey_updated_at_is_none_before_any_version_exists() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.latest_journey_updated_at("p1").unwrap().is_none());
    }

    #[test]
    fn latest_journey_updated_at_reflects_the_current_version() {
        let mut db = Database::open_in_memory().unwrap();
        db.create_journey_version("p1", "v1", "{}").unwrap();
        assert!(db.latest_journey_updated_at("p1").unwrap().is_some());
    }
}
