// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid MODEL_TIER value {0:?}, expected one of precision|balanced|rapid")]
    InvalidTier(String),

    #[error("invalid COMPACTION_STRATEGY value {0:?}, expected one of full|progressive|hierarchical")]
    InvalidCompactionStrategy(String),

    #[error("missing required environment variable {0}")]
    MissingEnvVar(String),

    #[error("environment variable {name} has invalid value {value:?}: {reason}")]
    InvalidEnvVar {
        name: String,
        value: String,
        reason: String,
    },
}
