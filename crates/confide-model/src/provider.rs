// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::error::ModelError;
use crate::types::{ChatResponse, Message, OptionalParams};

/// A chat-completion backend. The base generator (§4.2) talks to the
/// remote endpoint exclusively through this trait so it can be swapped for
/// a mock in tests without touching any task generator.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        optional: &OptionalParams,
    ) -> Result<ChatResponse, ModelError>;
}
