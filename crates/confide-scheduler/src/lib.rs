// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Dependency-ordered wave scheduling over the nine task generators (§4.5).
//!
//! Wave 1 runs `mood`/`topics`/`breakthrough` in parallel, bounded by a
//! semaphore sized from `POOL_SIZE`, followed by a sequential
//! `action_summary` gated on `topics` having succeeded. Wave 2 runs
//! `deep_analysis` then `prose`, gated on Wave 1 having produced at least
//! `topics`. Wave 3 regenerates a patient's Journey/Bridge documents,
//! debounced so a burst of newly-completed sessions collapses into one
//! regeneration.

mod cancel;
mod retry;
mod wave1;
mod wave2;
mod wave3;

pub use cancel::{CancelToken, CancellationRegistry};
pub use retry::{retry_with_backoff, MAX_RETRIES};
pub use wave1::{run_wave1, Wave1Input, Wave1Outcome};
pub use wave2::{run_wave2, Wave2Input, Wave2Outcome};
pub use wave3::{run_wave3, DebounceCoalescer, Wave3Input};

use std::sync::Arc;

use confide_model::ChatProvider;
use tokio::sync::Semaphore;

/// Shared dependencies threaded through every wave. `pool_size` bounds how
/// many generator calls run concurrently across the whole scheduler, not
/// per-session (§6's `POOL_SIZE`).
#[derive(Clone)]
pub struct SchedulerContext {
    pub provider: Arc<dyn ChatProvider>,
    pub semaphore: Arc<Semaphore>,
    pub cancellation: CancellationRegistry,
}

impl SchedulerContext {
    pub fn new(provider: Arc<dyn ChatProvider>, pool_size: usize) -> Self {
        Self {
            provider,
            semaphore: Arc::new(Semaphore::new(pool_size.max(1))),
            cancellation: CancellationRegistry::new(),
        }
    }
}
