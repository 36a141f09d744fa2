// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! SQLite-backed persistence for processing state, generation cost,
//! Journey/Bridge version history, and the pipeline event log (§4.6, §4.7,
//! §4.8).

mod db;
mod error;
mod schema;

pub use db::{Database, GenerationCostRow, RunningWave, WaveStatus};
pub use error::StoreError;
