// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ModelError;
use crate::provider::ChatProvider;
use crate::types::{ChatResponse, Message, OptionalParams, Usage};

/// Talks to an OpenAI-compatible chat-completion endpoint.
///
/// Per §9, some model families return an empty completion if *any* optional
/// parameter is present in the request body — even one explicitly set to a
/// default value. `complete` therefore builds the body with `{model,
/// messages}` only and merges in `temperature`/`top_p`/`max_tokens` solely
/// when the caller's `OptionalParams` sets them.
pub struct RemoteProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RemoteProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatProvider for RemoteProvider {
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        optional: &OptionalParams,
    ) -> Result<ChatResponse, ModelError> {
        let mut body = json!({
            "model": model,
            "messages": messages,
        });

        if !optional.is_empty() {
            let obj = body.as_object_mut().expect("body is always an object");
            if let Some(t) = optional.temperature {
                obj.insert("temperature".into(), json!(t));
            }
            if let Some(p) = optional.top_p {
                obj.insert("top_p".into(), json!(p));
            }
            if let Some(m) = optional.max_tokens {
                obj.insert("max_tokens".into(), json!(m));
            }
        }

        let resp = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(ModelError::Remote {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let payload: Value = resp.json().await?;
        parse_chat_completion(&payload)
    }
}

fn parse_chat_completion(payload: &Value) -> Result<ChatResponse, ModelError> {
    let content = payload
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| ModelError::Parse("missing choices[0].message.content".into()))?
        .to_string();

    let usage = payload.get("usage").ok_or_else(|| {
        ModelError::Parse("missing usage block in remote response".into())
    })?;
    let input_tokens = usage
        .get("prompt_tokens")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ModelError::Parse("missing usage.prompt_tokens".into()))?;
    let output_tokens = usage
        .get("completion_tokens")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ModelError::Parse("missing usage.completion_tokens".into()))?;

    Ok(ChatResponse {
        content,
        usage: Usage {
            input_tokens,
            output_tokens,
        },
    })
}
