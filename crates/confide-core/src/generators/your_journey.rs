// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use confide_compaction::CompactedContext;
use confide_model::{Generator, Message, ModelError, OptionalParams, TaskId};
use serde::Deserialize;

use crate::types::JourneyDoc;

#[derive(Debug, Clone)]
pub struct YourJourneyInput {
    pub context: CompactedContext,
}

const ACHIEVEMENTS_COUNT: usize = 5;
const CURRENT_FOCUS_COUNT: usize = 3;
const SECTIONS_COUNT: usize = 5;

#[derive(Debug, Deserialize)]
struct RawJourneyDoc {
    summary: String,
    #[serde(default, rename = "achievements")]
    achievements: Vec<String>,
    #[serde(default, rename = "currentFocus")]
    current_focus: Vec<String>,
    #[serde(default, rename = "sections")]
    sections: Vec<String>,
}

pub struct YourJourneyGenerator;

impl Generator for YourJourneyGenerator {
    type Input = YourJourneyInput;
    type Output = JourneyDoc;

    fn task_id(&self) -> TaskId {
        TaskId::YourJourney
    }

    fn build_messages(&self, input: &YourJourneyInput) -> Vec<Message> {
        let context = serde_json::to_string(&input.context).unwrap_or_default();
        vec![
            Message::system(format!(
                "Write a patient-facing journey roadmap from this client's \
                 therapy history. Respond with JSON: {{summary, \
                 achievements: string[{ACHIEVEMENTS_COUNT}], \
                 currentFocus: string[{CURRENT_FOCUS_COUNT}], \
                 sections: string[{SECTIONS_COUNT}]}}."
            )),
            Message::user(context),
        ]
    }

    fn parse_result(&self, raw_text: &str) -> Result<JourneyDoc, ModelError> {
        let raw: RawJourneyDoc =
            serde_json::from_str(raw_text).map_err(|e| ModelError::Parse(e.to_string()))?;

        if raw.achievements.len() != ACHIEVEMENTS_COUNT {
            return Err(ModelError::Parse(format!(
                "expected {ACHIEVEMENTS_COUNT} achievements, got {}",
                raw.achievements.len()
            )));
        }
        if raw.current_focus.len() != CURRENT_FOCUS_COUNT {
            return Err(ModelError::Parse(format!(
                "expected {CURRENT_FOCUS_COUNT} current focus items, got {}",
                raw.current_focus.len()
            )));
        }
        if raw.sections.len() != SECTIONS_COUNT {
            return Err(ModelError::Parse(format!(
                "expected {SECTIONS_COUNT} sections, got {}",
                raw.sections.len()
            )));
        }

        Ok(JourneyDoc {
            summary: raw.summary,
            achievements: raw.achievements,
            current_focus: raw.current_focus,
            sections: raw.sections,
        })
    }

    fn optional_params(&self) -> OptionalParams {
        OptionalParams::default()
    }
}
