// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Error taxonomy for the generator base (§7 of the design: `ConfigError`,
/// `TransportError`, `RemoteError`, `ParseError`). Scheduler-level error
/// kinds (`ValidationError`, `DependencyNotReadyError`, `CancelledError`,
/// `TimeoutError`) live in `confide-core` since they are not specific to
/// a single generation attempt.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("config error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote error: status {status}, body: {body}")]
    Remote { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(String),
}

impl ModelError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Transport(_) => true,
            ModelError::Remote { status, .. } => *status == 429 || *status >= 500,
            ModelError::Parse(_) => true,
            ModelError::Config(_) => false,
        }
    }
}
