// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use confide_model::{Generator, Message, ModelError, OptionalParams, TaskId};
use serde::{Deserialize, Serialize};

use crate::generators::DeepAnalysisResult;

#[derive(Debug, Clone)]
pub struct ProseInput {
    pub analysis: DeepAnalysisResult,
}

const MIN_WORDS: usize = 500;
const MAX_WORDS: usize = 750;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProseResult {
    pub prose_analysis: String,
    pub confidence: f32,
    /// False when the model's word count fell outside [500, 750]; the text
    /// is kept either way since truncating prose mid-narrative would be
    /// worse than a slightly out-of-range length.
    pub within_length_target: bool,
}

#[derive(Debug, Deserialize)]
struct RawProseResult {
    prose_analysis: String,
    confidence: f32,
}

pub struct ProseGenerator;

impl Generator for ProseGenerator {
    type Input = ProseInput;
    type Output = ProseResult;

    fn task_id(&self) -> TaskId {
        TaskId::Prose
    }

    fn build_messages(&self, input: &ProseInput) -> Vec<Message> {
        vec![
            Message::system(format!(
                "Write a single narrative-voice prose analysis of {MIN_WORDS}-{MAX_WORDS} \
                 words. No bullet points or numbered lists. Respond with JSON: \
                 {{prose_analysis, confidence: 0-1}}."
            )),
            Message::user(format!(
                "Progress: {}\nInsights: {}\nSkills: {}\nRelationship: {}\nRecommendations: {}",
                input.analysis.progress,
                input.analysis.insights,
                input.analysis.skills,
                input.analysis.relationship,
                input.analysis.recommendations,
            )),
        ]
    }

    fn parse_result(&self, raw_text: &str) -> Result<ProseResult, ModelError> {
        let raw: RawProseResult =
            serde_json::from_str(raw_text).map_err(|e| ModelError::Parse(e.to_string()))?;
        let word_count = raw.prose_analysis.split_whitespace().count();
        Ok(ProseResult {
            prose_analysis: raw.prose_analysis,
            confidence: raw.confidence.clamp(0.0, 1.0),
            within_length_target: (MIN_WORDS..=MAX_WORDS).contains(&word_count),
        })
    }

    fn optional_params(&self) -> OptionalParams {
        OptionalParams::default()
    }
}
