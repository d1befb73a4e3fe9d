// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0

// OpenAI Provider Adapter
//
// Anti-Corruption Layer for the OpenAI chat completions API.
// Also works with OpenAI-compatible APIs (LM Studio, vLLM, etc.) via endpoint.

use crate::domain::llm::{
    AIProvider, ChatMessage, ChatOptions, ChatResponse, ChatStream, FinishReason, LLMError,
    ProviderKind, StreamChunk, TokenUsage,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{body_lines, check_status, join_url, with_deadline};

pub struct OpenAIAdapter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Option<Duration>,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAIStreamEvent {
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAIDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAIAdapter {
    pub fn new(client: reqwest::Client, endpoint: String, api_key: String, model: String) -> Self {
        Self {
            client,
            endpoint,
            api_key,
            model,
            timeout: None,
        }
    }

    /// Deadline for non-streaming requests
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn request<'a>(
        &'a self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        stream: bool,
    ) -> OpenAIRequest<'a> {
        OpenAIRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| OpenAIMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stop: options.stop_sequences.clone(),
            stream,
        }
    }

    async fn post(&self, body: &OpenAIRequest<'_>) -> Result<reqwest::Response, LLMError> {
        let request = self
            .client
            .post(join_url(&self.endpoint, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(body);
        let request = if body.stream {
            request
        } else {
            with_deadline(request, self.timeout)
        };
        let response = request.send().await?;
        check_status(response, &self.model).await
    }
}

fn finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

/// One SSE line into an optional chunk; `None` skips keep-alives and blanks
fn parse_stream_line(line: &str) -> Option<Result<StreamChunk, LLMError>> {
    let data = line.strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(Ok(StreamChunk { content: String::new(), done: true }));
    }
    match serde_json::from_str::<OpenAIStreamEvent>(data) {
        Ok(event) => {
            let choice = event.choices.into_iter().next()?;
            if choice.finish_reason.as_deref() == Some("content_filter") {
                return Some(Err(LLMError::ContentFilter("content_filter".into())));
            }
            let content = choice.delta.content.unwrap_or_default();
            if content.is_empty() {
                None
            } else {
                Some(Ok(StreamChunk { content, done: false }))
            }
        }
        Err(e) => Some(Err(LLMError::Provider(format!("Failed to parse stream event: {}", e)))),
    }
}

#[async_trait]
impl AIProvider for OpenAIAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAI
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
        let request = self.request(messages, options, false);
        let response = self.post(&request).await?;

        let openai_response: OpenAIResponse = response.json().await?;

        let choice = openai_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::Provider("No response from model".into()))?;

        let finish = finish_reason(choice.finish_reason.as_deref());
        if finish == FinishReason::ContentFilter && choice.message.content.is_empty() {
            return Err(LLMError::ContentFilter("content_filter".into()));
        }

        let usage = openai_response
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(ChatResponse {
            content: choice.message.content,
            usage,
            provider: ProviderKind::OpenAI,
            model: openai_response.model.unwrap_or_else(|| self.model.clone()),
            finish_reason: finish,
        })
    }

    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatStream, LLMError> {
        let request = self.request(messages, options, true);
        let response = self.post(&request).await?;

        let chunks = body_lines(Box::pin(response.bytes_stream())).filter_map(|line| async move {
            match line {
                Ok(line) => parse_stream_line(&line),
                Err(e) => Some(Err(e)),
            }
        });
        Ok(Box::pin(chunks))
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        let request = self
            .client
            .get(join_url(&self.endpoint, "models"))
            .bearer_auth(&self.api_key);
        let response = with_deadline(request, self.timeout).send().await?;
        check_status(response, &self.model).await.map(|_| ())
    }
}
