// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Process-wide model selection tier, read from `MODEL_TIER`.
///
/// Tiers describe a speed/quality tradeoff, not a price point — cost is a
/// side effect of the model each tier resolves to, never the label itself.
/// `MODEL_TIER` is re-read live on every generator invocation rather than
/// cached for the process lifetime, so an operator can shift the whole
/// pipeline onto a cheaper or stronger tier without a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Precision,
    Balanced,
    Rapid,
}

impl Default for ModelTier {
    fn default() -> Self {
        ModelTier::Precision
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelTier::Precision => write!(f, "precision"),
            ModelTier::Balanced => write!(f, "balanced"),
            ModelTier::Rapid => write!(f, "rapid"),
        }
    }
}

impl FromStr for ModelTier {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "precision" => Ok(ModelTier::Precision),
            "balanced" => Ok(ModelTier::Balanced),
            "rapid" => Ok(ModelTier::Rapid),
            other => Err(ConfigError::InvalidTier(other.to_string())),
        }
    }
}

/// Strategy used by the compaction engine when summarising prior sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompactionStrategy {
    Full,
    Progressive,
    Hierarchical,
}

impl Default for CompactionStrategy {
    fn default() -> Self {
        CompactionStrategy::Hierarchical
    }
}

impl fmt::Display for CompactionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompactionStrategy::Full => write!(f, "full"),
            CompactionStrategy::Progressive => write!(f, "progressive"),
            CompactionStrategy::Hierarchical => write!(f, "hierarchical"),
        }
    }
}

impl FromStr for CompactionStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(CompactionStrategy::Full),
            "progressive" => Ok(CompactionStrategy::Progressive),
            "hierarchical" => Ok(CompactionStrategy::Hierarchical),
            other => Err(ConfigError::InvalidCompactionStrategy(other.to_string())),
        }
    }
}

/// Credentials and endpoint for the remote chat-completion API used by
/// every task generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub api_key: String,
    pub base_url: String,
}

/// Process-wide static configuration, resolved once at startup from the
/// environment.
///
/// `ModelTier` and `overrides` are deliberately *not* read only here for the
/// process lifetime: callers needing the live value call
/// [`crate::current_model_tier`] / [`crate::current_model_overrides`]
/// instead, which re-read `MODEL_TIER` / `MODEL_OVERRIDES` on every call, per
/// §4.1's "mutable via environment at any time" requirement for
/// `ModelTierConfig`. They are still populated here at load time so the
/// resolved config is fully visible as one value (e.g. via `show-config`).
/// Everything else in this struct is read once, since the spec does not
/// require those knobs to change without a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub pool_size: usize,
    pub compaction_strategy: CompactionStrategy,
    pub remote: RemoteConfig,
    pub event_sweep_ttl_hours: u64,
    pub sse_keepalive_seconds: u64,
    pub debounce_ms: u64,
    /// Per-task model overrides (`task name -> model id`), consulted by
    /// `confide-model`'s resolver before falling back to the active tier's
    /// default for that task (§4.1: `ModelTierConfig.overrides{task -> model}`).
    pub overrides: HashMap<String, String>,
}

impl Config {
    pub fn event_sweep_ttl(&self) -> Duration {
        Duration::from_secs(self.event_sweep_ttl_hours * 3600)
    }

    pub fn sse_keepalive(&self) -> Duration {
        Duration::from_secs(self.sse_keepalive_seconds)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

pub(crate) fn default_pool_size() -> usize {
    4
}

pub(crate) fn default_event_sweep_ttl_hours() -> u64 {
    24
}

pub(crate) fn default_sse_keepalive_seconds() -> u64 {
    5
}

pub(crate) fn default_debounce_ms() -> u64 {
    1000
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_tier_default_is_precision() {
        assert_eq!(ModelTier::default(), ModelTier::Precision);
    }

    #[test]
    fn model_tier_display_round_trips_through_from_str() {
        for tier in [ModelTier::Precision, ModelTier::Balanced, ModelTier::Rapid] {
            let s = tier.to_string();
            assert_eq!(s.parse::<ModelTier>().unwrap(), tier);
        }
    }

    #[test]
    fn model_tier_rejects_unknown_value() {
        let err = "blazing".parse::<ModelTier>().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTier(s) if s == "blazing"));
    }

    #[test]
    fn compaction_strategy_default_is_hierarchical() {
        assert_eq!(CompactionStrategy::default(), CompactionStrategy::Hierarchical);
    }

    #[test]
    fn compaction_strategy_display_round_trips_through_from_str() {
        for s in [
            CompactionStrategy::Full,
            CompactionStrategy::Progressive,
            CompactionStrategy::Hierarchical,
        ] {
            let text = s.to_string();
            assert_eq!(text.parse::<CompactionStrategy>().unwrap(), s);
        }
    }

    #[test]
    fn compaction_strategy_rejects_unknown_value() {
        let err = "lossy".parse::<CompactionStrategy>().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCompactionStrategy(s) if s == "lossy"));
    }

    #[test]
    fn config_duration_helpers_convert_units() {
        let cfg = Config {
            pool_size: default_pool_size(),
            compaction_strategy: CompactionStrategy::default(),
            remote: RemoteConfig {
                api_key: "k".into(),
                base_url: "http://localhost".into(),
            },
            event_sweep_ttl_hours: 2,
            sse_keepalive_seconds: 10,
            debounce_ms: 250,
            overrides: HashMap::new(),
        };
        assert_eq!(cfg.event_sweep_ttl(), Duration::from_secs(2 * 3600));
        assert_eq!(cfg.sse_keepalive(), Duration::from_secs(10));
        assert_eq!(cfg.debounce(), Duration::from_millis(250));
    }
}
