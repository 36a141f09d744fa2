// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use tracing::debug;

use crate::{
    schema::{
        default_debounce_ms, default_event_sweep_ttl_hours, default_pool_size,
        default_sse_keepalive_seconds,
    },
    Config, ConfigError, ModelTier, RemoteConfig,
};

/// Load the process-wide [`Config`] from environment variables.
///
/// `REMOTE_API_KEY` and `REMOTE_API_BASE_URL` are required; every other
/// variable falls back to the defaults documented alongside the `default_*`
/// helpers in [`crate::schema`]. `MODEL_TIER` is intentionally not read
/// here — it is re-read per call by [`current_model_tier`] so a tier change
/// takes effect without a restart.
pub fn load() -> Result<Config, ConfigError> {
    let api_key = require_env("REMOTE_API_KEY")?;
    let base_url = require_env("REMOTE_API_BASE_URL")?;

    let pool_size = parse_env_or("POOL_SIZE", default_pool_size())?;
    let compaction_strategy = match std::env::var("COMPACTION_STRATEGY") {
        Ok(v) => v.parse()?,
        Err(_) => Default::default(),
    };
    let event_sweep_ttl_hours =
        parse_env_or("EVENT_SWEEP_TTL_HOURS", default_event_sweep_ttl_hours())?;
    let sse_keepalive_seconds =
        parse_env_or("SSE_KEEPALIVE_SECONDS", default_sse_keepalive_seconds())?;
    let debounce_ms = parse_env_or("DEBOUNCE_MS", default_debounce_ms())?;
    let overrides = current_model_overrides()?;

    debug!(
        pool_size,
        %compaction_strategy,
        event_sweep_ttl_hours,
        sse_keepalive_seconds,
        debounce_ms,
        override_count = overrides.len(),
        "loaded config"
    );

    Ok(Config {
        pool_size,
        compaction_strategy,
        remote: RemoteConfig { api_key, base_url },
        event_sweep_ttl_hours,
        sse_keepalive_seconds,
        debounce_ms,
        overrides,
    })
}

/// Re-read `MODEL_TIER` from the environment. Falls back to
/// [`ModelTier::default`] when unset; returns an error only on an
/// unrecognised value, so a typo is visible rather than silently ignored.
pub fn current_model_tier() -> Result<ModelTier, ConfigError> {
    match std::env::var("MODEL_TIER") {
        Ok(v) => v.parse(),
        Err(_) => Ok(ModelTier::default()),
    }
}

/// Re-read `MODEL_OVERRIDES` from the environment: a JSON object mapping
/// task name (e.g. `"deep_analysis"`) to a model id, consulted by
/// `confide-model`'s resolver ahead of the active tier's default for that
/// task (§4.1). Falls back to an empty map when unset; an unparseable value
/// is a config error rather than a silently-ignored override.
pub fn current_model_overrides() -> Result<HashMap<String, String>, ConfigError> {
    match std::env::var("MODEL_OVERRIDES") {
        Ok(v) => serde_json::from_str(&v).map_err(|e| ConfigError::InvalidEnvVar {
            name: "MODEL_OVERRIDES".to_string(),
            value: v,
            reason: e.to_string(),
        }),
        Err(_) => Ok(HashMap::new()),
    }
}

fn require_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn parse_env_or<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(v) => v.parse().map_err(|e: T::Err| ConfigError::InvalidEnvVar {
            name: name.to_string(),
            value: v,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
