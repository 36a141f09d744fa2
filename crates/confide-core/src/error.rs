// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Full error taxonomy from §7, layered over [`confide_model::ModelError`]'s
/// generation-specific kinds. The scheduler matches on this to decide
/// retry vs fallback vs terminal-failure.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("config error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("dependency not ready: {0}")]
    DependencyNotReady(String),

    #[error("cancelled")]
    Cancelled,

    #[error("timeout after {0}ms")]
    Timeout(u64),
}

impl TaskError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskError::Transport(_) | TaskError::Remote(_) | TaskError::Parse(_) | TaskError::Timeout(_)
        )
    }
}

impl From<confide_model::ModelError> for TaskError {
    fn from(e: confide_model::ModelError) -> Self {
        match e {
            confide_model::ModelError::Config(m) => TaskError::Config(m),
            confide_model::ModelError::Transport(err) => TaskError::Transport(err.to_string()),
            confide_model::ModelError::Remote { status, body } => {
                TaskError::Remote(format!("status {status}: {body}"))
            }
            confide_model::ModelError::Parse(m) => TaskError::Parse(m),
        }
    }
}
