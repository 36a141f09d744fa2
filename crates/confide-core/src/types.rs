// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `{start_sec, end_sec, speaker_id, text}` per §3. Immutable once ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start_sec: f64,
    pub end_sec: f64,
    pub speaker_id: String,
    pub text: String,
}

impl TranscriptSegment {
    pub fn is_valid(&self) -> bool {
        self.start_sec < self.end_sec
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
}

/// The nine `wave` names used in the processing log (open string set per
/// §3 — no enumerated DB constraint — but these are the values this
/// codebase ever writes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Wave {
    Mood,
    Topics,
    Breakthrough,
    ActionSummary,
    Deep,
    Prose,
    SpeakerLabel,
    YourJourney,
    SessionBridge,
}

impl Wave {
    pub fn as_str(&self) -> &'static str {
        match self {
            Wave::Mood => "mood",
            Wave::Topics => "topics",
            Wave::Breakthrough => "breakthrough",
            Wave::ActionSummary => "action_summary",
            Wave::Deep => "deep",
            Wave::Prose => "prose",
            Wave::SpeakerLabel => "speaker_label",
            Wave::YourJourney => "your_journey",
            Wave::SessionBridge => "session_bridge",
        }
    }
}

/// Wave-1 fields, nullable until their generator has run. See §3's
/// Session entity and testable property 1 (wave ordering).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Wave1Fields {
    pub mood_score: Option<f32>,
    pub mood_confidence: Option<f32>,
    pub mood_rationale: Option<String>,
    pub mood_indicators: Vec<String>,
    pub emotional_tone: Option<String>,
    pub mood_analyzed_at: Option<DateTime<Utc>>,

    pub topics: Vec<String>,
    pub action_items: Vec<String>,
    pub technique: Option<String>,
    pub summary: Option<String>,
    pub topics_extracted_at: Option<DateTime<Utc>>,

    pub action_items_summary: Option<String>,

    pub has_breakthrough: Option<bool>,
    pub breakthrough_label: Option<String>,
    pub breakthrough_data: Option<serde_json::Value>,

    /// `speaker_id -> "Therapist" | "Client"`, from the `speaker_label` task.
    pub speaker_labels: BTreeMap<String, String>,
    pub speaker_label_confidence: Option<f32>,
    pub speaker_labeled_at: Option<DateTime<Utc>>,

    pub wave1_completed_at: Option<DateTime<Utc>>,
}

/// Wave-2 fields. `deep_analyzed_at`/`prose_generated_at` may only be set
/// after `wave1_completed_at` (testable property 1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Wave2Fields {
    pub deep_analysis: Option<serde_json::Value>,
    pub analysis_confidence: Option<f32>,
    pub deep_analyzed_at: Option<DateTime<Utc>>,

    pub prose_analysis: Option<String>,
    pub prose_generated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub patient_id: String,
    pub session_date: DateTime<Utc>,
    pub duration_minutes: u32,
    pub transcript: Vec<TranscriptSegment>,
    pub processing_status: ProcessingStatus,
    pub analysis_status: ProcessingStatus,
    pub wave1: Wave1Fields,
    pub wave2: Wave2Fields,
}

impl Session {
    /// Wave-2 is eligible to run once `topics` succeeded, even if `mood`
    /// or `breakthrough` failed — deep analysis needs topics as its
    /// minimum input (§4.5 partial failure semantics).
    pub fn wave2_eligible(&self) -> bool {
        self.wave1.wave1_completed_at.is_some() && !self.wave1.topics.is_empty()
    }
}

/// `generation_metadata`, linked to exactly one of a Journey or Bridge
/// version row (§3 XOR invariant, testable property 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub id: String,
    pub journey_version_id: Option<String>,
    pub bridge_version_id: Option<String>,
    pub sessions_analyzed: u32,
    pub total_sessions: u32,
    pub model_used: String,
    pub compaction_strategy: Option<String>,
    pub generation_timestamp: DateTime<Utc>,
    pub generation_duration_ms: u64,
}

impl GenerationMetadata {
    pub fn satisfies_xor_invariant(&self) -> bool {
        self.journey_version_id.is_some() ^ self.bridge_version_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyDoc {
    pub summary: String,
    pub achievements: Vec<String>,
    pub current_focus: Vec<String>,
    pub sections: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeDoc {
    pub share_concerns: Vec<String>,
    pub share_progress: Vec<String>,
    pub set_goals: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Transcript,
    Wave1,
    Wave2,
    Wave3,
}

/// Append-only progress signal (§4.7). Persisted by confide-store,
/// fanned out over SSE by confide-node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub id: i64,
    pub patient_id: String,
    pub phase: Phase,
    pub event_type: String,
    pub session_id: Option<String>,
    pub status: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub consumed: bool,
}
