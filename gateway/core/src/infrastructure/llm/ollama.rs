// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0

// Ollama Provider Adapter
//
// Anti-Corruption Layer for a local or self-hosted Ollama server.
// No API key; the host comes from configuration or OLLAMA_HOST.

use crate::domain::llm::{
    AIProvider, ChatMessage, ChatOptions, ChatResponse, ChatStream, FinishReason, LLMError,
    ProviderKind, StreamChunk, TokenUsage,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{body_lines, check_status, join_url, with_deadline};

pub struct OllamaAdapter {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    timeout: Option<Duration>,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessageRef<'a>>,
    stream: bool,
    options: OllamaOptions<'a>,
}

#[derive(Serialize)]
struct OllamaMessageRef<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaOptions<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

impl OllamaAdapter {
    pub fn new(client: reqwest::Client, endpoint: String, model: String) -> Self {
        Self {
            client,
            endpoint,
            model,
            timeout: None,
        }
    }

    /// Deadline for non-streaming requests
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn post(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        stream: bool,
    ) -> Result<reqwest::Response, LLMError> {
        let request = OllamaRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| OllamaMessageRef {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            stream,
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
                stop: options.stop_sequences.as_deref(),
            },
        };

        let http = self.client.post(join_url(&self.endpoint, "api/chat")).json(&request);
        let http = if stream {
            http
        } else {
            with_deadline(http, self.timeout)
        };
        let response = http.send().await.map_err(|e| {
            if e.is_connect() && !e.is_timeout() {
                LLMError::Network(format!("Ollama is not reachable at {}: {}", self.endpoint, e))
            } else {
                LLMError::from(e)
            }
        })?;
        check_status(response, &self.model).await
    }
}

/// One NDJSON line of a streamed reply
fn parse_stream_line(line: &str) -> Option<Result<StreamChunk, LLMError>> {
    if line.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<OllamaResponse>(line) {
        Ok(event) => {
            if let Some(error) = event.error {
                return Some(Err(LLMError::Provider(error)));
            }
            let content = event.message.map(|m| m.content).unwrap_or_default();
            if content.is_empty() && !event.done {
                return None;
            }
            Some(Ok(StreamChunk { content, done: event.done }))
        }
        Err(e) => Some(Err(LLMError::Provider(format!("Failed to parse stream event: {}", e)))),
    }
}

#[async_trait]
impl AIProvider for OllamaAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponse, LLMError> {
        let response = self.post(messages, options, false).await?;

        let ollama_response: OllamaResponse = response.json().await?;

        if let Some(error) = ollama_response.error {
            return Err(LLMError::Provider(error));
        }

        Ok(ChatResponse {
            content: ollama_response.message.map(|m| m.content).unwrap_or_default(),
            usage: TokenUsage::new(ollama_response.prompt_eval_count, ollama_response.eval_count),
            provider: ProviderKind::Ollama,
            model: ollama_response.model.unwrap_or_else(|| self.model.clone()),
            finish_reason: match ollama_response.done_reason.as_deref() {
                Some("length") => FinishReason::Length,
                _ => FinishReason::Stop,
            },
        })
    }

    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatStream, LLMError> {
        let response = self.post(messages, options, true).await?;

        let chunks = body_lines(Box::pin(response.bytes_stream())).filter_map(|line| async move {
            match line {
                Ok(line) => parse_stream_line(&line),
                Err(e) => Some(Err(e)),
            }
        });
        Ok(Box::pin(chunks))
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        let request = self.client.get(join_url(&self.endpoint, "api/tags"));
        let response = with_deadline(request, self.timeout).send().await?;
        check_status(response, &self.model).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ndjson_lines() {
        let chunk =
            parse_stream_line(r#"{"message":{"role":"assistant","content":"Hi"},"done":false}"#)
                .unwrap()
                .unwrap();
        assert_eq!(chunk, StreamChunk { content: "Hi".into(), done: false });

        let last = parse_stream_line(
            r#"{"message":{"role":"assistant","content":""},"done":true,"eval_count":4}"#,
        )
        .unwrap()
        .unwrap();
        assert!(last.done);

        assert!(parse_stream_line("   ").is_none());
        assert!(parse_stream_line(r#"{"error":"model not loaded"}"#).unwrap().is_err());
    }

    #[tokio::test]
    async fn test_chat_reads_eval_counts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "llama3.2",
                "stream": false,
                "options": {"num_predict": 64}
            })))
            .with_status(200)
            .with_body(concat!(
                r#"{"model":"llama3.2","message":{"role":"assistant","content":"Hello"},"#,
                r#""done":true,"prompt_eval_count":9,"eval_count":2}"#
            ))
            .create_async()
            .await;

        let adapter = OllamaAdapter::new(reqwest::Client::new(), server.url(), "llama3.2".into());
        let response = adapter
            .chat(&[ChatMessage::user("Hi")], &ChatOptions::with_limits(0.1, 64))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "Hello");
        assert_eq!(response.usage.total_tokens, 11);
        assert!(adapter.is_configured());
    }

    #[tokio::test]
    async fn test_stream_chat_yields_chunks_in_order() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(concat!(
                "{\"message\":{\"content\":\"Hel\"},\"done\":false}\n",
                "{\"message\":{\"content\":\"lo\"},\"done\":false}\n",
                "{\"message\":{\"content\":\"\"},\"done\":true}\n",
            ))
            .create_async()
            .await;

        let adapter = OllamaAdapter::new(reqwest::Client::new(), server.url(), "llama3.2".into());
        let chunks: Vec<StreamChunk> = adapter
            .stream_chat(&[ChatMessage::user("Hi")], &ChatOptions::default())
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;

        let text: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(text, "Hello");
        assert!(chunks.last().unwrap().done);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let adapter = OllamaAdapter::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1".into(),
            "llama3.2".into(),
        );
        let err = adapter
            .chat(&[ChatMessage::user("Hi")], &ChatOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::Network(_)));
    }
}
