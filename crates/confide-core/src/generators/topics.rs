// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use confide_model::{Generator, Message, ModelError, OptionalParams, TaskId};
use serde::{Deserialize, Serialize};

use crate::generators::truncate_without_mid_word_break;
use crate::types::TranscriptSegment;

#[derive(Debug, Clone)]
pub struct TopicsInput {
    pub transcript: Vec<TranscriptSegment>,
}

/// Known therapeutic techniques. A `technique` outside this library is
/// reported as `"Not specified"` rather than passed through verbatim,
/// since a hallucinated technique name is worse than an honest unknown.
const KNOWN_TECHNIQUES: &[&str] = &[
    "CBT",
    "DBT",
    "ACT",
    "EMDR",
    "Motivational Interviewing",
    "Psychodynamic",
    "Solution-Focused",
    "Mindfulness-Based",
    "Exposure Therapy",
    "Narrative Therapy",
];

const NOT_SPECIFIED: &str = "Not specified";
const SUMMARY_MAX_LEN: usize = 150;
const MAX_TOPICS: usize = 2;
const ACTION_ITEMS_COUNT: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicsResult {
    pub topics: Vec<String>,
    pub action_items: Vec<String>,
    pub technique: String,
    pub summary: String,
    pub confidence: f32,
}

#[derive(Debug, Deserialize)]
struct RawTopicsResult {
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    action_items: Vec<String>,
    #[serde(default)]
    technique: Option<String>,
    #[serde(default)]
    summary: String,
    confidence: f32,
}

pub struct TopicsGenerator;

impl Generator for TopicsGenerator {
    type Input = TopicsInput;
    type Output = TopicsResult;

    fn task_id(&self) -> TaskId {
        TaskId::Topics
    }

    fn build_messages(&self, input: &TopicsInput) -> Vec<Message> {
        let transcript = input
            .transcript
            .iter()
            .map(|s| format!("{}: {}", s.speaker_id, s.text))
            .collect::<Vec<_>>()
            .join("\n");
        vec![
            Message::system(format!(
                "Extract session topics, action items, and the therapeutic \
                 technique used. Return 1 to {MAX_TOPICS} topics and exactly \
                 {ACTION_ITEMS_COUNT} action items. `technique` must be one \
                 of: {}. If none clearly apply, use \"{NOT_SPECIFIED}\". \
                 Respond with JSON: {{topics: string[], action_items: \
                 string[], technique, summary (max {SUMMARY_MAX_LEN} chars), \
                 confidence: 0-1}}.",
                KNOWN_TECHNIQUES.join(", ")
            )),
            Message::user(transcript),
        ]
    }

    fn parse_result(&self, raw_text: &str) -> Result<TopicsResult, ModelError> {
        let mut raw: RawTopicsResult =
            serde_json::from_str(raw_text).map_err(|e| ModelError::Parse(e.to_string()))?;

        // Testable property 7: 1-2 topics, exactly 2 action items once this task succeeds.
        if raw.topics.is_empty() {
            return Err(ModelError::Parse("topics must have at least one entry".into()));
        }
        raw.topics.truncate(MAX_TOPICS);

        if raw.action_items.len() != ACTION_ITEMS_COUNT {
            return Err(ModelError::Parse(format!(
                "expected exactly {ACTION_ITEMS_COUNT} action items, got {}",
                raw.action_items.len()
            )));
        }

        let technique = raw
            .technique
            .filter(|t| KNOWN_TECHNIQUES.iter().any(|k| k.eq_ignore_ascii_case(t)))
            .unwrap_or_else(|| NOT_SPECIFIED.to_string());

        Ok(TopicsResult {
            topics: raw.topics,
            action_items: raw.action_items,
            technique,
            summary: truncate_without_mid_word_break(&raw.summary, SUMMARY_MAX_LEN),
            confidence: raw.confidence.clamp(0.0, 1.0),
        })
    }

    fn optional_params(&self) -> OptionalParams {
        OptionalParams::default()
    }
}
