// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use confide_model::{Generator, Message, ModelError, OptionalParams, TaskId};
use serde::{Deserialize, Serialize};

use crate::generators::snap_to_half_step;
use crate::types::TranscriptSegment;

/// Input is the client/patient speaker's segments only — the therapist's
/// speech is not mood-relevant (§4.3).
#[derive(Debug, Clone)]
pub struct MoodInput {
    pub patient_segments: Vec<TranscriptSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodResult {
    pub score: f32,
    pub confidence: f32,
    pub rationale: String,
    pub key_indicators: Vec<String>,
    pub emotional_tone: String,
}

#[derive(Debug, Deserialize)]
struct RawMoodResult {
    score: f32,
    confidence: f32,
    rationale: String,
    #[serde(default)]
    key_indicators: Vec<String>,
    emotional_tone: String,
}

pub struct MoodGenerator;

impl Generator for MoodGenerator {
    type Input = MoodInput;
    type Output = MoodResult;

    fn task_id(&self) -> TaskId {
        TaskId::Mood
    }

    fn build_messages(&self, input: &MoodInput) -> Vec<Message> {
        let transcript = input
            .patient_segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        vec![
            Message::system(
                "You rate a therapy client's mood from their own speech only. \
                 Respond with JSON: {score: 0-10, confidence: 0-1, rationale, \
                 key_indicators: string[], emotional_tone}.",
            ),
            Message::user(transcript),
        ]
    }

    fn parse_result(&self, raw_text: &str) -> Result<MoodResult, ModelError> {
        let raw: RawMoodResult =
            serde_json::from_str(raw_text).map_err(|e| ModelError::Parse(e.to_string()))?;
        Ok(MoodResult {
            score: snap_to_half_step(raw.score),
            confidence: raw.confidence.clamp(0.0, 1.0),
            rationale: raw.rationale,
            key_indicators: raw.key_indicators,
            emotional_tone: raw.emotional_tone,
        })
    }

    fn optional_params(&self) -> OptionalParams {
        OptionalParams::default()
    }
}
