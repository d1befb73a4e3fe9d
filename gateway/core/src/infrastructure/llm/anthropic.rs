// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0

// Anthropic Provider Adapter
//
// Anti-Corruption Layer for the Anthropic Messages API

use crate::domain::llm::{
    split_system, AIProvider, ChatMessage, ChatOptions, ChatResponse, FinishReason, LLMError,
    ProviderKind, Role, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{check_status, join_url, with_deadline};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Option<Duration>,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<&'a [String]>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    usage: AnthropicUsage,
    stop_reason: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicAdapter {
    pub fn new(client: reqwest::Client, endpoint: String, api_key: String, model: String) -> Self {
        Self {
            client,
            endpoint,
            api_key,
            model,
            timeout: None,
        }
    }

    /// Deadline for each request
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl AIProvider for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponse, LLMError> {
        let (system, turns) = split_system(messages);
        if turns.is_empty() {
            return Err(LLMError::InvalidInput("At least one user message is required".into()));
        }

        let request = AnthropicRequest {
            model: &self.model,
            messages: turns
                .iter()
                .map(|m| AnthropicMessage {
                    role: if m.role == Role::Assistant { "assistant" } else { "user" },
                    content: &m.content,
                })
                .collect(),
            max_tokens: options.max_tokens.unwrap_or(4096),
            system,
            temperature: options.temperature,
            stop_sequences: options.stop_sequences.as_deref(),
        };

        let http = self
            .client
            .post(join_url(&self.endpoint, "v1/messages"))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request);
        let response = with_deadline(http, self.timeout).send().await?;
        let response = check_status(response, &self.model).await?;

        let anthropic_response: AnthropicResponse = response.json().await?;

        let text: String = anthropic_response
            .content
            .iter()
            .filter(|c| c.kind == "text")
            .filter_map(|c| c.text.as_deref())
            .collect();

        Ok(ChatResponse {
            content: text,
            usage: TokenUsage::new(
                anthropic_response.usage.input_tokens,
                anthropic_response.usage.output_tokens,
            ),
            provider: ProviderKind::Anthropic,
            model: anthropic_response.model.unwrap_or_else(|| self.model.clone()),
            finish_reason: match anthropic_response.stop_reason.as_deref() {
                Some("max_tokens") => FinishReason::Length,
                Some("refusal") => FinishReason::ContentFilter,
                _ => FinishReason::Stop,
            },
        })
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        let request = self
            .client
            .get(join_url(&self.endpoint, "v1/models"))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        let response = with_deadline(request, self.timeout).send().await?;
        check_status(response, &self.model).await.map(|_| ())
    }
}
