// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use std::time::Instant;

use tracing::warn;

use crate::error::ModelError;
use crate::provider::ChatProvider;
use crate::registry::{cost_of, resolve_model, TaskId};
use crate::types::{CostEntry, Message, OptionalParams};

/// Per-call options threaded through `generate` (§4.2: `opts ⊇
/// {overrideModel, sessionId, patientId, extraMetadata, timeoutMs}`).
/// `extra_metadata` is carried by callers (confide-core) rather than here,
/// since this crate has no opinion on its shape.
#[derive(Debug, Clone, Default)]
pub struct GenerateOpts {
    pub override_model: Option<String>,
    pub session_id: Option<String>,
    pub patient_id: Option<String>,
}

/// Implemented by each of the nine task generators in C3. `Generator` is
/// deliberately small: prompt assembly and result parsing are the only
/// task-specific concerns, everything else (model resolution, invocation,
/// cost accounting) lives in [`generate`].
pub trait Generator: Send + Sync {
    type Input: Send + Sync;
    type Output: Send + Sync;

    fn task_id(&self) -> TaskId;

    fn build_messages(&self, input: &Self::Input) -> Vec<Message>;

    fn parse_result(&self, raw_text: &str) -> Result<Self::Output, ModelError>;

    /// Returned instead of failing when `parse_result` fails and the task
    /// declares a fallback; the generic generate() treats its presence as
    /// "recoverable parse failure".
    fn fallback_result(&self) -> Option<Self::Output> {
        None
    }

    /// Certain tasks (most prominently `action_summary`, per §9) must use
    /// minimal parameters because some model families empirically reject
    /// completions carrying any optional field. Generators requiring
    /// temperature/top-p/max-tokens override this.
    fn optional_params(&self) -> OptionalParams {
        OptionalParams::default()
    }
}

/// Implements §4.2's `generate(input, opts) -> {result, cost}` contract atop
/// any [`Generator`] and [`ChatProvider`].
pub async fn generate<G: Generator>(
    generator: &G,
    provider: &Arc<dyn ChatProvider>,
    input: &G::Input,
    opts: &GenerateOpts,
) -> Result<(G::Output, CostEntry), ModelError> {
    let started = Instant::now();
    let model = resolve_model(generator.task_id(), opts.override_model.as_deref())?;
    let messages = generator.build_messages(input);
    let optional = generator.optional_params();

    let response = provider.complete(&model, &messages, &optional).await?;

    let duration_ms = started.elapsed().as_millis() as u64;

    let result = match generator.parse_result(&response.content) {
        Ok(r) => r,
        Err(parse_err) => match generator.fallback_result() {
            Some(fallback) => {
                warn!(
                    task = generator.task_id().as_str(),
                    error = %parse_err,
                    "parse failed, using fallback result"
                );
                fallback
            }
            None => return Err(parse_err),
        },
    };

    let cost_usd = cost_of(&model, response.usage.input_tokens, response.usage.output_tokens)?;

    let cost = CostEntry {
        task: generator.task_id().as_str().to_string(),
        model,
        input_tokens: response.usage.input_tokens,
        output_tokens: response.usage.output_tokens,
        cost_usd,
        duration_ms,
        session_id: opts.session_id.clone(),
        patient_id: opts.patient_id.clone(),
    };

    Ok((result, cost))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Deserialize)]
    struct MoodLike {
        score: f32,
    }

    struct MoodTestGenerator;

    impl Generator for MoodTestGenerator {
        type Input = str;
        type Output = MoodLike;

        fn task_id(&self) -> TaskId {
            TaskId::Mood
        }

        fn build_messages(&self, input: &str) -> Vec<Message> {
            vec![Message::user(input.to_string())]
        }

        fn parse_result(&self, raw_text: &str) -> Result<MoodLike, ModelError> {
            serde_json::from_str(raw_text).map_err(|e| ModelError::Parse(e.to_string()))
        }

        fn fallback_result(&self) -> Option<MoodLike> {
            Some(MoodLike { score: 0.0 })
        }
    }

    struct ActionSummaryTestGenerator;

    impl Generator for ActionSummaryTestGenerator {
        type Input = str;
        type Output = String;

        fn task_id(&self) -> TaskId {
            TaskId::ActionSummary
        }

        fn build_messages(&self, input: &str) -> Vec<Message> {
            vec![Message::user(input.to_string())]
        }

        fn parse_result(&self, raw_text: &str) -> Result<String, ModelError> {
            Ok(raw_text.to_string())
        }

        fn optional_params(&self) -> OptionalParams {
            OptionalParams {
                temperature: Some(0.0),
                ..Default::default()
            }
        }
    }

    #[tokio::test]
    async fn generate_extracts_real_usage_tokens_not_estimated() {
        let mock = Arc::new(MockProvider::new());
        mock.push_text(r#"{"score": 7.5}"#, 123, 45);
        let provider: Arc<dyn ChatProvider> = mock.clone();

        let (result, cost) = generate(
            &MoodTestGenerator,
            &provider,
            "some transcript",
            &GenerateOpts::default(),
        )
        .await
        .unwrap();

        assert_eq!(result.score, 7.5);
        assert_eq!(cost.input_tokens, 123);
        assert_eq!(cost.output_tokens, 45);
        assert_eq!(cost.task, "mood");
    }

    #[tokio::test]
    async fn generate_falls_back_on_parse_failure_when_fallback_declared() {
        let mock = Arc::new(MockProvider::new());
        mock.push_text("not json at all", 10, 2);
        let provider: Arc<dyn ChatProvider> = mock.clone();

        let (result, _cost) = generate(
            &MoodTestGenerator,
            &provider,
            "transcript",
            &GenerateOpts::default(),
        )
        .await
        .unwrap();

        assert_eq!(result, MoodLike { score: 0.0 });
    }

    #[tokio::test]
    async fn generate_without_fallback_propagates_parse_error() {
        struct NoFallback;
        impl Generator for NoFallback {
            type Input = str;
            type Output = MoodLike;
            fn task_id(&self) -> TaskId {
                TaskId::Mood
            }
            fn build_messages(&self, input: &str) -> Vec<Message> {
                vec![Message::user(input.to_string())]
            }
            fn parse_result(&self, raw_text: &str) -> Result<MoodLike, ModelError> {
                serde_json::from_str(raw_text).map_err(|e| ModelError::Parse(e.to_string()))
            }
        }

        let mock = Arc::new(MockProvider::new());
        mock.push_text("garbage", 1, 1);
        let provider: Arc<dyn ChatProvider> = mock.clone();

        let err = generate(&NoFallback, &provider, "x", &GenerateOpts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Parse(_)));
    }

    #[tokio::test]
    async fn generate_omits_optional_params_by_default() {
        let mock = Arc::new(MockProvider::new());
        mock.push_text(r#"{"score": 1.0}"#, 1, 1);
        let provider: Arc<dyn ChatProvider> = mock.clone();

        generate(&MoodTestGenerator, &provider, "x", &GenerateOpts::default())
            .await
            .unwrap();

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].optional.temperature.is_none());
        assert!(calls[0].optional.max_tokens.is_none());
    }

    #[tokio::test]
    async fn generate_passes_optional_params_when_task_opts_in() {
        let mock = Arc::new(MockProvider::new());
        mock.push_text("a short summary", 5, 3);
        let provider: Arc<dyn ChatProvider> = mock.clone();

        generate(
            &ActionSummaryTestGenerator,
            &provider,
            "x",
            &GenerateOpts::default(),
        )
        .await
        .unwrap();

        let calls = mock.calls();
        assert_eq!(calls[0].optional.temperature, Some(0.0));
    }
}
