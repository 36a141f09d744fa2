// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use rusqlite::Connection;

use crate::error::StoreError;

/// Bump and drop-recreate whenever a table definition changes; this store
/// has no data worth migrating across schema changes yet (§4.6/§4.8).
pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current_version != 0 && current_version != SCHEMA_VERSION {
        drop_all_tables(conn)?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS patients (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            patient_id TEXT NOT NULL,
            session_date TEXT NOT NULL,
            duration_minutes INTEGER NOT NULL,
            transcript_json TEXT NOT NULL,
            processing_status TEXT NOT NULL,
            analysis_status TEXT NOT NULL,
            wave1_json TEXT,
            wave2_json TEXT,
            wave1_completed_at TEXT,
            FOREIGN KEY (patient_id) REFERENCES patients(id)
        );

        CREATE TABLE IF NOT EXISTS processing_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            wave TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            error TEXT,
            FOREIGN KEY (session_id) REFERENCES sessions(id)
        );

        CREATE TABLE IF NOT EXISTS generation_cost (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task TEXT NOT NULL,
            model TEXT NOT NULL,
            input_tokens INTEGER NOT NULL,
            output_tokens INTEGER NOT NULL,
            cost_usd REAL NOT NULL,
            duration_ms INTEGER NOT NULL,
            session_id TEXT,
            patient_id TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pipeline_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            patient_id TEXT NOT NULL,
            phase TEXT NOT NULL,
            event_type TEXT NOT NULL,
            session_id TEXT,
            status TEXT NOT NULL,
            details_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            consumed INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS journey_versions (
            id TEXT PRIMARY KEY,
            patient_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            doc_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS journey_latest (
            patient_id TEXT PRIMARY KEY,
            version_id TEXT NOT NULL REFERENCES journey_versions(id)
        );

        CREATE TABLE IF NOT EXISTS bridge_versions (
            id TEXT PRIMARY KEY,
            patient_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            doc_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS bridge_latest (
            patient_id TEXT PRIMARY KEY,
            version_id TEXT NOT NULL REFERENCES bridge_versions(id)
        );

        CREATE TABLE IF NOT EXISTS generation_metadata (
            id TEXT PRIMARY KEY,
            journey_version_id TEXT,
            bridge_version_id TEXT,
            sessions_analyzed INTEGER NOT NULL,
            total_sessions INTEGER NOT NULL,
            model_used TEXT NOT NULL,
            compaction_strategy TEXT,
            generation_timestamp TEXT NOT NULL,
            generation_duration_ms INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_patient ON sessions(patient_id);
        CREATE INDEX IF NOT EXISTS idx_processing_log_session ON processing_log(session_id, wave);
        CREATE INDEX IF NOT EXISTS idx_pipeline_events_patient ON pipeline_events(patient_id, id);
        CREATE INDEX IF NOT EXISTS idx_journey_versions_patient ON journey_versions(patient_id, version DESC);
        CREATE INDEX IF NOT EXISTS idx_bridge_versions_patient ON bridge_versions(patient_id, version DESC);
        "#,
    )?;

    conn.execute(&format!("PRAGMA user_version = {SCHEMA_VERSION}"), [])?;
    Ok(())
}

fn drop_all_tables(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS generation_metadata;
        DROP TABLE IF EXISTS bridge_latest;
        DROP TABLE IF EXISTS bridge_versions;
        DROP TABLE IF EXISTS journey_latest;
        DROP TABLE IF EXISTS journey_versions;
        DROP TABLE IF EXISTS pipeline_events;
        DROP TABLE IF EXISTS generation_cost;
        DROP TABLE IF EXISTS processing_log;
        DROP TABLE IF EXISTS sessions;
        DROP TABLE IF EXISTS patients;
        "#,
    )?;
    Ok(())
}
