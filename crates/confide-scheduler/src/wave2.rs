// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use confide_compaction::CompactedContext;
use confide_core::generators::{DeepAnalysisGenerator, DeepAnalysisInput, DeepAnalysisResult, ProseGenerator, ProseInput, ProseResult};
use confide_core::types::TranscriptSegment;
use confide_model::{CostEntry, GenerateOpts};

use crate::wave1::run_generator;
use crate::SchedulerContext;

pub struct Wave2Input {
    pub session_id: String,
    pub patient_id: String,
    pub transcript: Vec<TranscriptSegment>,
    pub topics: Vec<String>,
    pub mood_score: Option<f32>,
    pub has_breakthrough: bool,
    pub prior_context: Option<CompactedContext>,
}

#[derive(Debug, Default)]
pub struct Wave2Outcome {
    pub deep_analysis: Option<DeepAnalysisResult>,
    pub prose: Option<ProseResult>,
    pub costs: Vec<CostEntry>,
}

/// Runs `deep_analysis` then, only if it succeeded, `prose` — `prose`
/// has no independent input, it narrates `deep_analysis`'s five dimensions
/// (§4.3, §4.5: Wave-2 is itself sequential, unlike Wave-1's fan-out).
pub async fn run_wave2(ctx: &SchedulerContext, input: Wave2Input) -> Wave2Outcome {
    let opts = GenerateOpts {
        override_model: None,
        session_id: Some(input.session_id.clone()),
        patient_id: Some(input.patient_id.clone()),
    };

    let mut outcome = Wave2Outcome::default();

    let deep_input = DeepAnalysisInput {
        transcript: input.transcript,
        topics: input.topics,
        mood_score: input.mood_score,
        has_breakthrough: input.has_breakthrough,
        prior_context: input.prior_context,
    };

    let deep_result = run_generator(ctx, &DeepAnalysisGenerator, &deep_input, &opts).await;
    let analysis = match deep_result {
        Ok((result, cost)) => {
            outcome.costs.push(cost);
            outcome.deep_analysis = Some(result.clone());
            Some(result)
        }
        Err(err) => {
            tracing::warn!(session_id = %input.session_id, error = %err, "deep analysis failed, wave 2 stops here");
            None
        }
    };

    if let Some(analysis) = analysis {
        let prose_input = ProseInput { analysis };
        match run_generator(ctx, &ProseGenerator, &prose_input, &opts).await {
            Ok((result, cost)) => {
                outcome.prose = Some(result);
                outcome.costs.push(cost);
            }
            Err(err) => tracing::warn!(session_id = %input.session_id, error = %err, "prose generation failed"),
        }
    }

    outcome
}
