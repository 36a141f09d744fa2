// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};
use std::time::{Duration, Instant};

use confide_config::ModelTier;

use crate::error::ModelError;

/// One of the nine generation tasks named in §4.3. `Deep`/`Prose`/`YourJourney`
/// /`SessionBridge`/`Breakthrough` are the "heavyweight" set the `balanced`
/// tier substitutes a mid model for; the rest stay on their precision model
/// in `balanced`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskId {
    Mood,
    Topics,
    Breakthrough,
    ActionSummary,
    DeepAnalysis,
    Prose,
    SpeakerLabel,
    YourJourney,
    SessionBridge,
}

impl TaskId {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskId::Mood => "mood",
            TaskId::Topics => "topics",
            TaskId::Breakthrough => "breakthrough",
            TaskId::ActionSummary => "action_summary",
            TaskId::DeepAnalysis => "deep_analysis",
            TaskId::Prose => "prose",
            TaskId::SpeakerLabel => "speaker_label",
            TaskId::YourJourney => "your_journey",
            TaskId::SessionBridge => "session_bridge",
        }
    }

    fn is_heavyweight(&self) -> bool {
        matches!(
            self,
            TaskId::DeepAnalysis
                | TaskId::Prose
                | TaskId::YourJourney
                | TaskId::SessionBridge
                | TaskId::Breakthrough
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

const STRONG_MODEL: &str = "gpt-4o";
const MID_MODEL: &str = "gpt-4o-mini";
const CHEAP_MODEL: &str = "gpt-4o-nano";

/// Static pricing table. Every model id this registry can ever resolve to
/// must have an entry here; `price_of` fails closed with `ConfigError`
/// rather than guessing a price for an unknown id.
const PRICING: &[(&str, Pricing)] = &[
    (
        STRONG_MODEL,
        Pricing {
            input_per_million: 5.00,
            output_per_million: 15.00,
        },
    ),
    (
        MID_MODEL,
        Pricing {
            input_per_million: 0.15,
            output_per_million: 0.60,
        },
    ),
    (
        CHEAP_MODEL,
        Pricing {
            input_per_million: 0.05,
            output_per_million: 0.20,
        },
    ),
];

fn model_for(task: TaskId, tier: ModelTier) -> &'static str {
    match tier {
        ModelTier::Precision => STRONG_MODEL,
        ModelTier::Balanced => {
            if task.is_heavyweight() {
                MID_MODEL
            } else {
                STRONG_MODEL
            }
        }
        ModelTier::Rapid => CHEAP_MODEL,
    }
}

/// Re-reads `MODEL_TIER`/`MODEL_OVERRIDES` on every call but caches the
/// result for up to one second so hot paths (Wave-1's three parallel
/// generators) don't each hit `std::env::var` independently. Matches the
/// spec's "nanosecond-resolution TTL... picked up within one second"
/// requirement, for both halves of `ModelTierConfig` (§3: `{current_tier,
/// overrides}`).
struct TierCache {
    cell: RwLock<(Instant, ModelTier, HashMap<String, String>)>,
}

impl TierCache {
    fn new() -> Self {
        let tier = confide_config::current_model_tier().unwrap_or_default();
        let overrides = confide_config::current_model_overrides().unwrap_or_default();
        Self {
            cell: RwLock::new((Instant::now(), tier, overrides)),
        }
    }

    fn get(&self) -> Result<(ModelTier, HashMap<String, String>), ModelError> {
        {
            let guard = self.cell.read().unwrap();
            if guard.0.elapsed() < Duration::from_secs(1) {
                return Ok((guard.1, guard.2.clone()));
            }
        }
        let tier = confide_config::current_model_tier()
            .map_err(|e| ModelError::Config(e.to_string()))?;
        let overrides = confide_config::current_model_overrides()
            .map_err(|e| ModelError::Config(e.to_string()))?;
        let mut guard = self.cell.write().unwrap();
        *guard = (Instant::now(), tier, overrides.clone());
        Ok((tier, overrides))
    }
}

fn tier_cache() -> &'static TierCache {
    static CACHE: OnceLock<TierCache> = OnceLock::new();
    CACHE.get_or_init(TierCache::new)
}

/// Maps `(task, tier, overrides)` to a concrete model id, in the three-step
/// order §4.1 defines: an explicit `override_model` wins outright; else the
/// process-wide `ModelTierConfig.overrides[task]` entry for this task, if
/// any; else the active tier's default for the task. Both `override_model`
/// and a config-level override are validated against the pricing table,
/// since naming an unpriced model either way is a config error per §4.1.
pub fn resolve_model(task: TaskId, override_model: Option<&str>) -> Result<String, ModelError> {
    if let Some(m) = override_model {
        price_of(m)?;
        return Ok(m.to_string());
    }
    let (tier, overrides) = tier_cache().get()?;
    resolve_with_tier_and_overrides(task, tier, &overrides)
}

/// Pure step 2+3 of `resolve_model`, split out so the override-map
/// precedence can be unit-tested without the live `MODEL_TIER`/
/// `MODEL_OVERRIDES` cache.
fn resolve_with_tier_and_overrides(
    task: TaskId,
    tier: ModelTier,
    overrides: &HashMap<String, String>,
) -> Result<String, ModelError> {
    if let Some(m) = overrides.get(task.as_str()) {
        price_of(m)?;
        return Ok(m.clone());
    }
    Ok(model_for(task, tier).to_string())
}

pub fn price_of(model_id: &str) -> Result<Pricing, ModelError> {
    PRICING
        .iter()
        .find(|(id, _)| *id == model_id)
        .map(|(_, p)| *p)
        .ok_or_else(|| ModelError::Config(format!("unknown model id {model_id:?}")))
}

pub fn cost_of(model_id: &str, input_tokens: u64, output_tokens: u64) -> Result<f64, ModelError> {
    let pricing = price_of(model_id)?;
    let input_cost = (input_tokens as f64 / 1_000_000.0) * pricing.input_per_million;
    let output_cost = (output_tokens as f64 / 1_000_000.0) * pricing.output_per_million;
    Ok(input_cost + output_cost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn precision_tier_uses_strong_model_for_every_task() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::remove_var("MODEL_TIER");
        for task in [TaskId::Mood, TaskId::DeepAnalysis, TaskId::SessionBridge] {
            assert_eq!(model_for(task, ModelTier::Precision), STRONG_MODEL);
        }
    }

    #[test]
    fn balanced_tier_substitutes_mid_model_only_for_heavyweight_tasks() {
        assert_eq!(model_for(TaskId::DeepAnalysis, ModelTier::Balanced), MID_MODEL);
        assert_eq!(model_for(TaskId::Prose, ModelTier::Balanced), MID_MODEL);
        assert_eq!(model_for(TaskId::Breakthrough, ModelTier::Balanced), MID_MODEL);
        assert_eq!(model_for(TaskId::Mood, ModelTier::Balanced), STRONG_MODEL);
        assert_eq!(model_for(TaskId::Topics, ModelTier::Balanced), STRONG_MODEL);
    }

    #[test]
    fn rapid_tier_uses_cheapest_model_for_every_task() {
        for task in [
            TaskId::Mood,
            TaskId::Topics,
            TaskId::Breakthrough,
            TaskId::ActionSummary,
            TaskId::DeepAnalysis,
            TaskId::Prose,
            TaskId::SpeakerLabel,
            TaskId::YourJourney,
            TaskId::SessionBridge,
        ] {
            assert_eq!(model_for(task, ModelTier::Rapid), CHEAP_MODEL);
        }
    }

    #[test]
    fn resolve_model_prefers_explicit_override() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::set_var("MODEL_TIER", "rapid");
        let resolved = resolve_model(TaskId::Mood, Some(STRONG_MODEL)).unwrap();
        assert_eq!(resolved, STRONG_MODEL);
        std::env::remove_var("MODEL_TIER");
    }

    #[test]
    fn resolve_model_rejects_unknown_override() {
        let err = resolve_model(TaskId::Mood, Some("not-a-real-model")).unwrap_err();
        assert!(matches!(err, ModelError::Config(_)));
    }

    #[test]
    fn price_of_unknown_model_is_config_error() {
        let err = price_of("totally-unknown").unwrap_err();
        assert!(matches!(err, ModelError::Config(_)));
    }

    #[test]
    fn cost_of_scales_linearly_with_tokens() {
        let cost_1m_in = cost_of(STRONG_MODEL, 1_000_000, 0).unwrap();
        assert!((cost_1m_in - 5.00).abs() < 1e-9);
        let cost_1m_out = cost_of(STRONG_MODEL, 0, 1_000_000).unwrap();
        assert!((cost_1m_out - 15.00).abs() < 1e-9);
    }

    #[test]
    fn tier_resolution_is_idempotent_for_fixed_tier() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::set_var("MODEL_TIER", "balanced");
        let a = resolve_model(TaskId::Prose, None).unwrap();
        let b = resolve_model(TaskId::Prose, None).unwrap();
        assert_eq!(a, b);
        std::env::remove_var("MODEL_TIER");
    }

    #[test]
    fn override_map_entry_beats_tier_default() {
        let mut overrides = HashMap::new();
        overrides.insert(TaskId::DeepAnalysis.as_str().to_string(), MID_MODEL.to_string());
        let resolved = resolve_with_tier_and_overrides(TaskId::DeepAnalysis, ModelTier::Precision, &overrides).unwrap();
        assert_eq!(resolved, MID_MODEL);
    }

    #[test]
    fn override_map_is_consulted_per_task() {
        let mut overrides = HashMap::new();
        overrides.insert(TaskId::Mood.as_str().to_string(), CHEAP_MODEL.to_string());
        // Topics has no override entry, so it still falls through to the tier default.
        let resolved = resolve_with_tier_and_overrides(TaskId::Topics, ModelTier::Precision, &overrides).unwrap();
        assert_eq!(resolved, STRONG_MODEL);
    }

    #[test]
    fn override_map_entry_naming_an_unpriced_model_is_a_config_error() {
        let mut overrides = HashMap::new();
        overrides.insert(TaskId::Mood.as_str().to_string(), "not-a-real-model".to_string());
        let err = resolve_with_tier_and_overrides(TaskId::Mood, ModelTier::Precision, &overrides).unwrap_err();
        assert!(matches!(err, ModelError::Config(_)));
    }

    #[test]
    fn explicit_override_model_still_wins_over_the_config_level_override_map() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::set_var("MODEL_OVERRIDES", r#"{"mood":"gpt-4o-mini"}"#);
        let resolved = resolve_model(TaskId::Mood, Some(STRONG_MODEL)).unwrap();
        assert_eq!(resolved, STRONG_MODEL);
        std::env::remove_var("MODEL_OVERRIDES");
    }
}
