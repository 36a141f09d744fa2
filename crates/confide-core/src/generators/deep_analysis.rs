// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use confide_compaction::CompactedContext;
use confide_model::{Generator, Message, ModelError, OptionalParams, TaskId};
use serde::{Deserialize, Serialize};

use crate::types::TranscriptSegment;

/// Only runs once Wave-1 has completed for the same session (§4.5); the
/// scheduler is responsible for that gating, this generator just consumes
/// whatever Wave-1 produced.
#[derive(Debug, Clone)]
pub struct DeepAnalysisInput {
    pub transcript: Vec<TranscriptSegment>,
    pub topics: Vec<String>,
    pub mood_score: Option<f32>,
    pub has_breakthrough: bool,
    pub prior_context: Option<CompactedContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepAnalysisResult {
    pub progress: String,
    pub insights: String,
    pub skills: String,
    pub relationship: String,
    pub recommendations: String,
    pub confidence: f32,
}

#[derive(Debug, Deserialize)]
struct RawDeepAnalysisResult {
    progress: String,
    insights: String,
    skills: String,
    relationship: String,
    recommendations: String,
    confidence: f32,
}

pub struct DeepAnalysisGenerator;

impl Generator for DeepAnalysisGenerator {
    type Input = DeepAnalysisInput;
    type Output = DeepAnalysisResult;

    fn task_id(&self) -> TaskId {
        TaskId::DeepAnalysis
    }

    fn build_messages(&self, input: &DeepAnalysisInput) -> Vec<Message> {
        let transcript = input
            .transcript
            .iter()
            .map(|s| format!("{}: {}", s.speaker_id, s.text))
            .collect::<Vec<_>>()
            .join("\n");
        let context = input
            .prior_context
            .as_ref()
            .map(|c| serde_json::to_string(c).unwrap_or_default())
            .unwrap_or_default();
        vec![
            Message::system(
                "Produce a clinical deep analysis across exactly five dimensions: \
                 progress, insights, skills, relationship, recommendations. \
                 Respond with JSON: {progress, insights, skills, relationship, \
                 recommendations, confidence: 0-1}.",
            ),
            Message::user(format!(
                "Topics: {:?}\nMood score: {:?}\nBreakthrough: {}\nPrior context: {}\n\nTranscript:\n{transcript}",
                input.topics, input.mood_score, input.has_breakthrough, context
            )),
        ]
    }

    fn parse_result(&self, raw_text: &str) -> Result<DeepAnalysisResult, ModelError> {
        let raw: RawDeepAnalysisResult =
            serde_json::from_str(raw_text).map_err(|e| ModelError::Parse(e.to_string()))?;
        Ok(DeepAnalysisResult {
            progress: raw.progress,
            insights: raw.insights,
            skills: raw.skills,
            relationship: raw.relationship,
            recommendations: raw.recommendations,
            confidence: raw.confidence.clamp(0.0, 1.0),
        })
    }

    fn optional_params(&self) -> OptionalParams {
        OptionalParams::default()
    }
}
