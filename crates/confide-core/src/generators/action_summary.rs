// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use confide_model::{Generator, Message, ModelError, OptionalParams, TaskId};
use serde::{Deserialize, Serialize};

use crate::generators::truncate_without_mid_word_break;

/// Runs only after `topics` succeeds, taking its `action_items` as input
/// (§4.5 partial failure semantics: if `topics` failed there is nothing to
/// summarize and this task is skipped by the scheduler, not invoked at all).
#[derive(Debug, Clone)]
pub struct ActionSummaryInput {
    pub action_items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSummaryResult {
    pub summary: String,
}

const SUMMARY_MAX_LEN: usize = 45;

pub struct ActionSummaryGenerator;

impl Generator for ActionSummaryGenerator {
    type Input = ActionSummaryInput;
    type Output = Option<ActionSummaryResult>;

    fn task_id(&self) -> TaskId {
        TaskId::ActionSummary
    }

    fn build_messages(&self, input: &ActionSummaryInput) -> Vec<Message> {
        vec![Message::user(format!(
            "Summarize these action items in under {SUMMARY_MAX_LEN} characters, \
             plain text, no JSON:\n{}",
            input.action_items.join("; ")
        ))]
    }

    /// Minimal parameters per §9: some model families return an empty
    /// completion if `action_summary` is called with any optional field set.
    fn optional_params(&self) -> OptionalParams {
        OptionalParams::default()
    }

    fn parse_result(&self, raw_text: &str) -> Result<Option<ActionSummaryResult>, ModelError> {
        let trimmed = raw_text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        Ok(Some(ActionSummaryResult {
            summary: truncate_without_mid_word_break(trimmed, SUMMARY_MAX_LEN),
        }))
    }

    /// An empty or unusable completion is a non-fatal outcome for this
    /// task, not a pipeline failure (§4.5).
    fn fallback_result(&self) -> Option<Option<ActionSummaryResult>> {
        Some(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_completion_yields_none_not_error() {
        let result = ActionSummaryGenerator.parse_result("   ").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn non_empty_completion_is_truncated_to_limit() {
        let text = "practice breathing exercises daily and journal before bed every night";
        let result = ActionSummaryGenerator.parse_result(text).unwrap().unwrap();
        assert!(result.summary.chars().count() <= SUMMARY_MAX_LEN);
    }

    #[test]
    fn fallback_result_is_none_not_an_error() {
        assert_eq!(ActionSummaryGenerator.fallback_result(), Some(None));
    }
}
