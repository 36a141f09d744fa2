// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Builds tiered context for Journey and Bridge regeneration (§4.4).
//!
//! This crate is a pure function of its inputs: no I/O, no clock, no
//! randomness. Callers (confide-core's `your_journey`/`session_bridge`
//! generators) own fetching prior sessions from the store and feeding them
//! in recency order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A previously-analyzed session, as much as compaction needs of it.
/// `session_insights` is populated only when a Tier-1 `session_insights`
/// AI call has already been made for this session; Tier-2/3 never need it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorSessionData {
    pub session_date: String,
    pub mood_score: Option<f32>,
    pub topics: Vec<String>,
    pub summary: Option<String>,
    pub has_breakthrough: bool,
    pub deep_analysis: Option<serde_json::Value>,
    pub session_insights: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct CompactionInput {
    /// Most recent first.
    pub prior_sessions: Vec<PriorSessionData>,
    pub previous_journey_summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompactionStrategy {
    Full,
    Progressive,
    Hierarchical,
}

impl From<confide_config::CompactionStrategy> for CompactionStrategy {
    fn from(s: confide_config::CompactionStrategy) -> Self {
        match s {
            confide_config::CompactionStrategy::Full => CompactionStrategy::Full,
            confide_config::CompactionStrategy::Progressive => CompactionStrategy::Progressive,
            confide_config::CompactionStrategy::Hierarchical => CompactionStrategy::Hierarchical,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierOneEntry {
    pub session_date: String,
    pub insights: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierTwoEntry {
    pub session_date: String,
    /// ~300 characters, extracted from `deep_analysis` without an
    /// additional AI call.
    pub paragraph: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum CompactedContext {
    Full {
        sessions_by_date: BTreeMap<String, PriorSessionData>,
        previous_journey_summary: Option<String>,
    },
    Progressive {
        previous_journey_summary: Option<String>,
        current_session: Option<PriorSessionData>,
    },
    Hierarchical {
        tier1: Vec<TierOneEntry>,
        tier2: Vec<TierTwoEntry>,
        tier3: Option<String>,
        previous_journey_summary: Option<String>,
    },
}

const TIER1_SIZE: usize = 3;
const TIER2_SIZE: usize = 4;
const TIER3_CAP: usize = 30;

/// Pure entry point: partitions `input.prior_sessions` (assumed ordered
/// most-recent-first) per `strategy` and returns the resulting context.
pub fn compact(strategy: CompactionStrategy, input: &CompactionInput) -> CompactedContext {
    match strategy {
        CompactionStrategy::Full => compact_full(input),
        CompactionStrategy::Progressive => compact_progressive(input),
        CompactionStrategy::Hierarchical => compact_hierarchical(input),
    }
}

fn compact_full(input: &CompactionInput) -> CompactedContext {
    let sessions_by_date = input
        .prior_sessions
        .iter()
        .map(|s| (s.session_date.clone(), s.clone()))
        .collect();
    CompactedContext::Full {
        sessions_by_date,
        previous_journey_summary: input.previous_journey_summary.clone(),
    }
}

fn compact_progressive(input: &CompactionInput) -> CompactedContext {
    CompactedContext::Progressive {
        previous_journey_summary: input.previous_journey_summary.clone(),
        current_session: input.prior_sessions.first().cloned(),
    }
}

fn compact_hierarchical(input: &CompactionInput) -> CompactedContext {
    let sessions = &input.prior_sessions;
    let capped_len = sessions.len().min(TIER3_CAP);

    let tier1_end = sessions.len().min(TIER1_SIZE);
    let tier2_end = sessions.len().min(TIER1_SIZE + TIER2_SIZE);
    let tier3_end = capped_len;

    let tier1 = sessions[..tier1_end]
        .iter()
        .map(|s| TierOneEntry {
            session_date: s.session_date.clone(),
            insights: s
                .session_insights
                .clone()
                .unwrap_or_else(|| default_insights(s)),
        })
        .collect();

    let tier2 = sessions[tier1_end..tier2_end]
        .iter()
        .map(|s| TierTwoEntry {
            session_date: s.session_date.clone(),
            paragraph: paragraph_from_deep_analysis(s),
        })
        .collect();

    let tier3 = if tier2_end < tier3_end {
        Some(journey_arc(&sessions[tier2_end..tier3_end]))
    } else {
        None
    };

    CompactedContext::Hierarchical {
        tier1,
        tier2,
        tier3,
        previous_journey_summary: input.previous_journey_summary.clone(),
    }
}

fn default_insights(s: &PriorSessionData) -> Vec<String> {
    let mut insights = Vec::new();
    if let Some(score) = s.mood_score {
        insights.push(format!("mood {score}"));
    }
    if !s.topics.is_empty() {
        insights.push(format!("topics: {}", s.topics.join(", ")));
    }
    if s.has_breakthrough {
        insights.push("breakthrough observed".to_string());
    }
    insights
}

/// Extracts a ~300-char paragraph from `deep_analysis` without an
/// additional AI call, per §4.4 Tier 2.
fn paragraph_from_deep_analysis(s: &PriorSessionData) -> String {
    const TARGET_LEN: usize = 300;
    let source = s
        .deep_analysis
        .as_ref()
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.values()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|s| !s.is_empty())
        .or_else(|| s.summary.clone())
        .unwrap_or_default();

    truncate_at_char_boundary(&source, TARGET_LEN)
}

fn journey_arc(sessions: &[PriorSessionData]) -> String {
    let dates: Vec<&str> = sessions.iter().map(|s| s.session_date.as_str()).collect();
    let breakthroughs = sessions.iter().filter(|s| s.has_breakthrough).count();
    format!(
        "Sessions {} through {} ({} total, {} with breakthroughs).",
        dates.last().copied().unwrap_or(""),
        dates.first().copied().unwrap_or(""),
        sessions.len(),
        breakthroughs
    )
}

fn truncate_at_char_boundary(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
