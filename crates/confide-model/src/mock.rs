// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ModelError;
use crate::provider::ChatProvider;
use crate::types::{ChatResponse, Message, OptionalParams, Usage};

/// Deterministic [`ChatProvider`] for tests. Returns queued responses in
/// order and records every call it received, so generator tests can assert
/// on prompt assembly and optional-parameter opt-in without a network call.
pub struct MockProvider {
    responses: Mutex<Vec<Result<ChatResponse, ModelError>>>,
    calls: Mutex<Vec<MockCall>>,
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub model: String,
    pub messages: Vec<Message>,
    pub optional: OptionalParamsSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionalParamsSnapshot {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push_text(&self, content: impl Into<String>, input_tokens: u64, output_tokens: u64) {
        self.responses.lock().unwrap().push(Ok(ChatResponse {
            content: content.into(),
            usage: Usage {
                input_tokens,
                output_tokens,
            },
        }));
    }

    pub fn push_error(&self, err: ModelError) {
        self.responses.lock().unwrap().push(Err(err));
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        optional: &OptionalParams,
    ) -> Result<ChatResponse, ModelError> {
        self.calls.lock().unwrap().push(MockCall {
            model: model.to_string(),
            messages: messages.to_vec(),
            optional: OptionalParamsSnapshot {
                temperature: optional.temperature,
                top_p: optional.top_p,
                max_tokens: optional.max_tokens,
            },
        });
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(ModelError::Config("MockProvider: no queued response".into()));
        }
        responses.remove(0)
    }
}
