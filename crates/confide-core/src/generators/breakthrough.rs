// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use confide_model::{Generator, Message, ModelError, OptionalParams, TaskId};
use serde::{Deserialize, Serialize};

use crate::types::TranscriptSegment;

#[derive(Debug, Clone)]
pub struct BreakthroughInput {
    pub transcript: Vec<TranscriptSegment>,
}

/// Below this confidence, `has_breakthrough` is forced to `false` even if
/// the model asserted `true` — a low-confidence breakthrough claim is
/// treated as noise, not a finding (§4.3 hard rule).
const MIN_CONFIDENCE: f32 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakthroughResult {
    pub has_breakthrough: bool,
    pub label: Option<String>,
    pub evidence_quote: Option<String>,
    pub timestamp_range: Option<(f64, f64)>,
    pub confidence: f32,
}

#[derive(Debug, Deserialize)]
struct RawBreakthroughResult {
    has_breakthrough: bool,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    evidence_quote: Option<String>,
    #[serde(default)]
    timestamp_start: Option<f64>,
    #[serde(default)]
    timestamp_end: Option<f64>,
    confidence: f32,
}

pub struct BreakthroughGenerator;

impl Generator for BreakthroughGenerator {
    type Input = BreakthroughInput;
    type Output = BreakthroughResult;

    fn task_id(&self) -> TaskId {
        TaskId::Breakthrough
    }

    fn build_messages(&self, input: &BreakthroughInput) -> Vec<Message> {
        let transcript = input
            .transcript
            .iter()
            .map(|s| format!("[{:.1}-{:.1}] {}: {}", s.start_sec, s.end_sec, s.speaker_id, s.text))
            .collect::<Vec<_>>()
            .join("\n");
        vec![
            Message::system(
                "Identify whether this session contains a genuine therapeutic \
                 breakthrough. Only claim one if you are highly confident. \
                 Respond with JSON: {has_breakthrough: bool, label, \
                 evidence_quote, timestamp_start, timestamp_end, \
                 confidence: 0-1}.",
            ),
            Message::user(transcript),
        ]
    }

    fn parse_result(&self, raw_text: &str) -> Result<BreakthroughResult, ModelError> {
        let raw: RawBreakthroughResult =
            serde_json::from_str(raw_text).map_err(|e| ModelError::Parse(e.to_string()))?;

        let confidence = raw.confidence.clamp(0.0, 1.0);
        let has_breakthrough = raw.has_breakthrough && confidence >= MIN_CONFIDENCE;

        Ok(BreakthroughResult {
            has_breakthrough,
            label: if has_breakthrough { raw.label } else { None },
            evidence_quote: if has_breakthrough { raw.evidence_quote } else { None },
            timestamp_range: match (raw.timestamp_start, raw.timestamp_end) {
                (Some(s), Some(e)) if has_breakthrough => Some((s, e)),
                _ => None,
            },
            confidence,
        })
    }

    fn optional_params(&self) -> OptionalParams {
        OptionalParams::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: serde_json::Value) -> BreakthroughResult {
        BreakthroughGenerator.parse_result(&json.to_string()).unwrap()
    }

    #[test]
    fn low_confidence_breakthrough_is_forced_false() {
        let result = parse(serde_json::json!({
            "has_breakthrough": true,
            "label": "insight",
            "evidence_quote": "I finally see it",
            "timestamp_start": 10.0,
            "timestamp_end": 20.0,
            "confidence": 0.6,
        }));
        assert!(!result.has_breakthrough);
        assert!(result.label.is_none());
        assert!(result.timestamp_range.is_none());
    }

    #[test]
    fn high_confidence_breakthrough_is_preserved() {
        let result = parse(serde_json::json!({
            "has_breakthrough": true,
            "label": "insight",
            "evidence_quote": "I finally see it",
            "timestamp_start": 10.0,
            "timestamp_end": 20.0,
            "confidence": 0.95,
        }));
        assert!(result.has_breakthrough);
        assert_eq!(result.label.as_deref(), Some("insight"));
        assert_eq!(result.timestamp_range, Some((10.0, 20.0)));
    }

    #[test]
    fn no_breakthrough_claim_ignores_confidence() {
        let result = parse(serde_json::json!({
            "has_breakthrough": false,
            "confidence": 0.99,
        }));
        assert!(!result.has_breakthrough);
    }

    #[test]
    fn boundary_confidence_exactly_at_threshold_counts() {
        let result = parse(serde_json::json!({
            "has_breakthrough": true,
            "confidence": 0.8,
        }));
        assert!(result.has_breakthrough);
    }
}
