// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use confide_core::generators::{
    ActionSummaryGenerator, ActionSummaryInput, ActionSummaryResult, BreakthroughGenerator,
    BreakthroughInput, BreakthroughResult, MoodGenerator, MoodInput, MoodResult,
    SpeakerLabelGenerator, SpeakerLabelResult, TopicsGenerator, TopicsInput, TopicsResult,
};
use confide_core::types::TranscriptSegment;
use confide_core::TaskError;
use confide_model::{generate, CostEntry, GenerateOpts, Generator, TaskId};

use crate::SchedulerContext;

/// Per-attempt deadline (§5): deep analysis gets more room than the other
/// eight tasks because it synthesizes the whole transcript plus prior
/// context, not just a single generator call's worth of text.
const DEEP_ANALYSIS_DEADLINE: Duration = Duration::from_secs(300);
const DEFAULT_DEADLINE: Duration = Duration::from_secs(60);

fn deadline_for(task_id: TaskId) -> Duration {
    match task_id {
        TaskId::DeepAnalysis => DEEP_ANALYSIS_DEADLINE,
        _ => DEFAULT_DEADLINE,
    }
}

pub struct Wave1Input {
    pub session_id: String,
    pub patient_id: String,
    pub transcript: Vec<TranscriptSegment>,
}

#[derive(Debug, Default)]
pub struct Wave1Outcome {
    pub mood: Option<MoodResult>,
    pub topics: Option<TopicsResult>,
    pub breakthrough: Option<BreakthroughResult>,
    pub action_summary: Option<ActionSummaryResult>,
    pub speaker_label: Option<SpeakerLabelResult>,
    pub costs: Vec<CostEntry>,
    /// True once `topics` has succeeded — the minimum Wave-2 requires
    /// (§4.5 partial failure semantics).
    pub wave1_completed: bool,
}

pub(crate) async fn run_generator<G: Generator>(
    ctx: &SchedulerContext,
    generator: &G,
    input: &G::Input,
    opts: &GenerateOpts,
) -> Result<(G::Output, CostEntry), TaskError> {
    if let Some(patient_id) = &opts.patient_id {
        if ctx.cancellation.is_stopped(patient_id) {
            return Err(TaskError::Cancelled);
        }
    }
    let _permit = ctx
        .semaphore
        .clone()
        .acquire_owned()
        .await
        .expect("scheduler semaphore is never closed");

    let deadline = deadline_for(generator.task_id());
    let cancel = opts.patient_id.as_ref().map(|id| ctx.cancellation.token_for(id));

    let attempts = crate::retry_with_backoff(|| async {
        match tokio::time::timeout(deadline, generate(generator, &ctx.provider, input, opts)).await {
            Ok(result) => result.map_err(TaskError::from),
            Err(_) => Err(TaskError::Timeout(deadline.as_millis() as u64)),
        }
    });

    // Races every attempt (and any backoff sleep between them) against a
    // patient stop, so `/stop` never waits out a multi-second backoff
    // before the in-flight generator call is abandoned (§5, §8 S4).
    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(TaskError::Cancelled),
                result = attempts => result,
            }
        }
        None => attempts.await,
    }
}

/// Runs the four independent Wave-1 generators in parallel, then
/// `action_summary` sequentially — only if `topics` succeeded, since it is
/// the only one of the four whose output `action_summary` consumes.
pub async fn run_wave1(ctx: &SchedulerContext, input: Wave1Input) -> Wave1Outcome {
    let opts = GenerateOpts {
        override_model: None,
        session_id: Some(input.session_id.clone()),
        patient_id: Some(input.patient_id.clone()),
    };

    let mood_input = MoodInput {
        patient_segments: input.transcript.clone(),
    };
    let topics_input = TopicsInput {
        transcript: input.transcript.clone(),
    };
    let breakthrough_input = BreakthroughInput {
        transcript: input.transcript.clone(),
    };
    let speaker_label_generator = SpeakerLabelGenerator::new(input.transcript.clone());

    let (mood_result, topics_result, breakthrough_result, speaker_label_result) = tokio::join!(
        run_generator(ctx, &MoodGenerator, &mood_input, &opts),
        run_generator(ctx, &TopicsGenerator, &topics_input, &opts),
        run_generator(ctx, &BreakthroughGenerator, &breakthrough_input, &opts),
        run_generator(ctx, &speaker_label_generator, &(), &opts),
    );

    let mut outcome = Wave1Outcome::default();

    match mood_result {
        Ok((result, cost)) => {
            outcome.mood = Some(result);
            outcome.costs.push(cost);
        }
        Err(err) => tracing::warn!(session_id = %input.session_id, error = %err, "mood generation failed"),
    }

    match breakthrough_result {
        Ok((result, cost)) => {
            outcome.breakthrough = Some(result);
            outcome.costs.push(cost);
        }
        Err(err) => tracing::warn!(session_id = %input.session_id, error = %err, "breakthrough generation failed"),
    }

    match speaker_label_result {
        Ok((result, cost)) => {
            outcome.speaker_label = Some(result);
            outcome.costs.push(cost);
        }
        Err(err) => tracing::warn!(session_id = %input.session_id, error = %err, "speaker label generation failed"),
    }

    match topics_result {
        Ok((result, cost)) => {
            outcome.costs.push(cost);
            outcome.wave1_completed = true;

            if !result.action_items.is_empty() {
                let action_summary_input = ActionSummaryInput {
                    action_items: result.action_items.clone(),
                };
                match run_generator(ctx, &ActionSummaryGenerator, &action_summary_input, &opts).await {
                    Ok((summary, cost)) => {
                        outcome.action_summary = summary;
                        outcome.costs.push(cost);
                    }
                    Err(err) => {
                        tracing::warn!(session_id = %input.session_id, error = %err, "action summary generation failed, continuing without it")
                    }
                }
            }

            outcome.topics = Some(result);
        }
        Err(err) => {
            tracing::warn!(session_id = %input.session_id, error = %err, "topics generation failed, wave 1 will not unlock wave 2");
        }
    }

    outcome
}
