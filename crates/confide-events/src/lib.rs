// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Durable pipeline-event fan-out (§4.7): every progress event is persisted
//! through `confide-store` before it is broadcast, so an SSE subscriber can
//! always catch up on what it missed via a watermark instead of losing
//! events it wasn't connected in time to see live.

mod bus;
mod stream;
mod sweeper;

pub use bus::{EventBus, NewEvent};
pub use stream::{subscribe_patient, SseFrame};
pub use sweeper::run_sweeper;
