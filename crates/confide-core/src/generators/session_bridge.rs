// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use confide_compaction::CompactedContext;
use confide_model::{Generator, Message, ModelError, OptionalParams, TaskId};
use serde::Deserialize;

use crate::types::BridgeDoc;

#[derive(Debug, Clone)]
pub struct SessionBridgeInput {
    pub context: CompactedContext,
}

const SHARE_CONCERNS_COUNT: usize = 4;
const SHARE_PROGRESS_COUNT: usize = 4;
const SET_GOALS_COUNT: usize = 4;

#[derive(Debug, Deserialize)]
struct RawBridgeDoc {
    #[serde(default, rename = "shareConcerns")]
    share_concerns: Vec<String>,
    #[serde(default, rename = "shareProgress")]
    share_progress: Vec<String>,
    #[serde(default, rename = "setGoals")]
    set_goals: Vec<String>,
}

pub struct SessionBridgeGenerator;

impl Generator for SessionBridgeGenerator {
    type Input = SessionBridgeInput;
    type Output = BridgeDoc;

    fn task_id(&self) -> TaskId {
        TaskId::SessionBridge
    }

    fn build_messages(&self, input: &SessionBridgeInput) -> Vec<Message> {
        let context = serde_json::to_string(&input.context).unwrap_or_default();
        vec![
            Message::system(format!(
                "Write patient-facing talking points to help this client bring \
                 their therapy progress into conversation with people in their \
                 life. Respond with JSON: {{shareConcerns: string[{SHARE_CONCERNS_COUNT}], \
                 shareProgress: string[{SHARE_PROGRESS_COUNT}], \
                 setGoals: string[{SET_GOALS_COUNT}]}}."
            )),
            Message::user(context),
        ]
    }

    fn parse_result(&self, raw_text: &str) -> Result<BridgeDoc, ModelError> {
        let raw: RawBridgeDoc =
            serde_json::from_str(raw_text).map_err(|e| ModelError::Parse(e.to_string()))?;

        if raw.share_concerns.len() != SHARE_CONCERNS_COUNT {
            return Err(ModelError::Parse(format!(
                "expected {SHARE_CONCERNS_COUNT} shareConcerns, got {}",
                raw.share_concerns.len()
            )));
        }
        if raw.share_progress.len() != SHARE_PROGRESS_COUNT {
            return Err(ModelError::Parse(format!(
                "expected {SHARE_PROGRESS_COUNT} shareProgress, got {}",
                raw.share_progress.len()
            )));
        }
        if raw.set_goals.len() != SET_GOALS_COUNT {
            return Err(ModelError::Parse(format!(
                "expected {SET_GOALS_COUNT} setGoals, got {}",
                raw.set_goals.len()
            )));
        }

        Ok(BridgeDoc {
            share_concerns: raw.share_concerns,
            share_progress: raw.share_progress,
            set_goals: raw.set_goals,
        })
    }

    fn optional_params(&self) -> OptionalParams {
        OptionalParams::default()
    }
}
