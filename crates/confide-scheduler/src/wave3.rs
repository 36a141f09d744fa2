// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use confide_compaction::CompactedContext;
use confide_core::generators::{SessionBridgeGenerator, SessionBridgeInput, YourJourneyGenerator, YourJourneyInput};
use confide_core::types::{BridgeDoc, JourneyDoc};
use confide_model::{CostEntry, GenerateOpts};

use crate::wave1::run_generator;
use crate::SchedulerContext;

pub struct Wave3Input {
    pub patient_id: String,
    pub context: CompactedContext,
    pub total_sessions: u32,
}

#[derive(Debug, Default)]
pub struct Wave3Outcome {
    pub journey: Option<JourneyDoc>,
    pub bridge: Option<BridgeDoc>,
    pub costs: Vec<CostEntry>,
    /// Set when `total_sessions < 2` — the Bridge document is still
    /// generated for single-session patients, but flagged low-confidence
    /// rather than withheld (§9 Open Question).
    pub low_confidence: bool,
}

/// Regenerates both the Journey and Bridge documents for a patient from
/// the given tiered context. The two are independent outputs of the same
/// compaction input, so they run concurrently rather than gating each
/// other (§4.4, §4.5).
pub async fn run_wave3(ctx: &SchedulerContext, input: Wave3Input) -> Wave3Outcome {
    let opts = GenerateOpts {
        override_model: None,
        session_id: None,
        patient_id: Some(input.patient_id.clone()),
    };

    let journey_input = YourJourneyInput {
        context: input.context.clone(),
    };
    let bridge_input = SessionBridgeInput {
        context: input.context.clone(),
    };

    let (journey_result, bridge_result) = tokio::join!(
        run_generator(ctx, &YourJourneyGenerator, &journey_input, &opts),
        run_generator(ctx, &SessionBridgeGenerator, &bridge_input, &opts),
    );

    let mut outcome = Wave3Outcome {
        low_confidence: input.total_sessions < 2,
        ..Default::default()
    };

    match journey_result {
        Ok((doc, cost)) => {
            outcome.journey = Some(doc);
            outcome.costs.push(cost);
        }
        Err(err) => tracing::warn!(patient_id = %input.patient_id, error = %err, "journey generation failed"),
    }

    match bridge_result {
        Ok((doc, cost)) => {
            outcome.bridge = Some(doc);
            outcome.costs.push(cost);
        }
        Err(err) => tracing::warn!(patient_id = %input.patient_id, error = %err, "bridge generation failed"),
    }

    outcome
}

/// Coalesces a burst of Wave-3 triggers for the same patient into a single
/// run after `debounce` has elapsed with no further triggers. A newly
/// completed session often arrives moments after a sibling session's, and
/// regenerating the Journey/Bridge once per patient-burst instead of once
/// per session avoids redundant generation calls (§4.5, §6 `DEBOUNCE_MS`,
/// default 1000ms — empirically chosen, not derived from a hard constraint).
#[derive(Clone, Default)]
pub struct DebounceCoalescer {
    generations: Arc<Mutex<HashMap<String, u64>>>,
}

impl DebounceCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F, Fut>(&self, patient_id: String, debounce: Duration, run: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generations = self.generations.clone();
        let my_generation = {
            let mut guard = generations.lock().unwrap();
            let counter = guard.entry(patient_id.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let still_current = *generations.lock().unwrap().get(&patient_id).unwrap_or(&0) == my_generation;
            if still_current {
                run().await;
            }
        });
    }
}
