// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Llm
//!
//! Provider-neutral chat completion interface.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Isolates the AI service from vendor chat APIs

// AI Provider Domain Interface (Anti-Corruption Layer)
//
// Every vendor adapter in infrastructure/llm/ translates between these types
// and its own wire format. The fallback loop in the application layer only
// ever sees `AIProvider` and `LLMError`.

use async_trait::async_trait;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

/// Supported AI backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    #[serde(rename = "openai")]
    OpenAI,
    Anthropic,
    Ollama,
}

impl ProviderKind {
    /// Built-in priority order used when nothing else is configured
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Gemini,
        ProviderKind::OpenAI,
        ProviderKind::Anthropic,
        ProviderKind::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAI => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Ollama => "ollama",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "Google Gemini",
            ProviderKind::OpenAI => "OpenAI",
            ProviderKind::Anthropic => "Anthropic Claude",
            ProviderKind::Ollama => "Ollama (Self-Hosted)",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com",
            ProviderKind::OpenAI => "https://api.openai.com/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com",
            ProviderKind::Ollama => "http://localhost:11434",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini-1.5-flash",
            ProviderKind::OpenAI => "gpt-4o-mini",
            ProviderKind::Anthropic => "claude-3-5-haiku-latest",
            ProviderKind::Ollama => "llama3.2",
        }
    }

    /// Environment variable holding the API key, if the provider needs one
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Gemini => Some("GEMINI_API_KEY"),
            ProviderKind::OpenAI => Some("OPENAI_API_KEY"),
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderKind::Ollama => None,
        }
    }

    /// Environment variable overriding the endpoint
    pub fn endpoint_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Ollama => Some("OLLAMA_HOST"),
            _ => None,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        self.api_key_env().is_some()
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = LLMError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "openai" => Ok(ProviderKind::OpenAI),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(LLMError::InvalidInput(format!("Unknown AI provider: {}", other))),
        }
    }
}

/// Domain interface for AI providers
#[async_trait]
pub trait AIProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Model identifier sent to the vendor API
    fn model(&self) -> &str;

    /// Whether the provider has the credentials it needs to be called
    fn is_configured(&self) -> bool;

    /// Run a chat completion
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponse, LLMError>;

    /// Stream a chat completion. Adapters without native streaming
    /// yield the whole completion as a single final chunk.
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatStream, LLMError> {
        let response = self.chat(messages, options).await?;
        let chunk = StreamChunk {
            content: response.content,
            done: true,
        };
        Ok(Box::pin(stream::iter(vec![Ok(chunk)])))
    }

    /// Check if provider is reachable and accepts our credentials
    async fn health_check(&self) -> Result<(), LLMError>;
}

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, LLMError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Joins all system messages into one block, for vendors that take the
/// system prompt outside the message list.
pub fn split_system(messages: &[ChatMessage]) -> (Option<String>, Vec<&ChatMessage>) {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let rest = messages.iter().filter(|m| m.role != Role::System).collect();

    let system = if system.is_empty() {
        None
    } else {
        Some(system.join("\n\n"))
    };
    (system, rest)
}

/// Options for chat generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOptions {
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 = deterministic, 1.0 = creative)
    pub temperature: Option<f32>,

    /// Sequences that stop generation
    pub stop_sequences: Option<Vec<String>>,
}

impl ChatOptions {
    pub fn with_limits(temperature: f32, max_tokens: u32) -> Self {
        Self {
            max_tokens: Some(max_tokens),
            temperature: Some(temperature),
            stop_sequences: None,
        }
    }
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            max_tokens: Some(4096),
            temperature: Some(0.7),
            stop_sequences: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    /// Generated text
    pub content: String,

    /// Token usage stats
    pub usage: TokenUsage,

    /// Provider that produced the completion
    pub provider: ProviderKind,

    /// Model used (e.g., "gpt-4o-mini", "llama3.2")
    pub model: String,

    /// Why generation stopped
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// Reason why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural completion (model decided to stop)
    Stop,

    /// Hit max_tokens limit
    Length,

    /// Blocked by content filter
    ContentFilter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamChunk {
    pub content: String,
    pub done: bool,
}

/// Coarse classification used by the fallback loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// HTTP 401/403, bad or missing key
    Auth,
    /// HTTP 429
    RateLimited,
    /// HTTP 5xx
    Server,
    Other,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Auth => "auth",
            FailureClass::RateLimited => "rate_limited",
            FailureClass::Server => "server",
            FailureClass::Other => "other",
        }
    }
}

/// Errors that can occur during AI provider operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum LLMError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded (HTTP 429)")]
    RateLimit,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Blocked by safety filter: {0}")]
    ContentFilter(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl LLMError {
    /// Maps a non-success HTTP status into a domain error
    pub fn from_status(status: u16, body: String, model: &str) -> Self {
        match status {
            401 | 403 => LLMError::Authentication(body),
            429 => LLMError::RateLimit,
            404 => LLMError::ModelNotFound(model.to_string()),
            400 | 413 | 422 => LLMError::InvalidInput(body),
            s if s >= 500 => LLMError::Server { status: s, message: body },
            s => LLMError::Provider(format!("HTTP {}: {}", s, body)),
        }
    }

    pub fn failure_class(&self) -> FailureClass {
        match self {
            LLMError::Authentication(_) => FailureClass::Auth,
            LLMError::RateLimit => FailureClass::RateLimited,
            LLMError::Server { .. } => FailureClass::Server,
            _ => FailureClass::Other,
        }
    }

    /// Whether repeating the same request against the same provider may help
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LLMError::RateLimit | LLMError::Server { .. } | LLMError::Network(_) | LLMError::Timeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let class = |status| LLMError::from_status(status, String::new(), "m").failure_class();
        assert_eq!(class(401), FailureClass::Auth);
        assert_eq!(class(403), FailureClass::Auth);
        assert_eq!(class(429), FailureClass::RateLimited);
        assert_eq!(class(503), FailureClass::Server);
        assert_eq!(class(404), FailureClass::Other);
        assert!(matches!(
            LLMError::from_status(404, "".into(), "gpt"),
            LLMError::ModelNotFound(m) if m == "gpt"
        ));
        assert!(matches!(
            LLMError::from_status(400, "too long".into(), "m"),
            LLMError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_transient_errors() {
        assert!(LLMError::RateLimit.is_transient());
        assert!(LLMError::Timeout.is_transient());
        assert!(LLMError::Server { status: 502, message: String::new() }.is_transient());
        assert!(!LLMError::Authentication("nope".into()).is_transient());
        assert!(!LLMError::InvalidInput("x".into()).is_transient());
    }

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("Gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!(" openai ".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAI);
        assert_eq!("claude".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert!("watson".parse::<ProviderKind>().is_err());
        assert_eq!(ProviderKind::OpenAI.to_string(), "openai");
        assert!(!ProviderKind::Ollama.requires_api_key());
    }

    #[test]
    fn test_split_system_joins_system_messages() {
        let messages = vec![
            ChatMessage::system("You are helpful."),
            ChatMessage::user("Hi"),
            ChatMessage::system("Be brief."),
        ];
        let (system, rest) = split_system(&messages);
        assert_eq!(system.as_deref(), Some("You are helpful.\n\nBe brief."));
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_default_stream_yields_single_chunk() {
        use futures::StreamExt;

        struct Fixed;

        #[async_trait]
        impl AIProvider for Fixed {
            fn kind(&self) -> ProviderKind {
                ProviderKind::Ollama
            }

            fn model(&self) -> &str {
                "fixed"
            }

            fn is_configured(&self) -> bool {
                true
            }

            async fn chat(
                &self,
                _: &[ChatMessage],
                _: &ChatOptions,
            ) -> Result<ChatResponse, LLMError> {
                Ok(ChatResponse {
                    content: "hello".into(),
                    usage: TokenUsage::new(1, 1),
                    provider: ProviderKind::Ollama,
                    model: "fixed".into(),
                    finish_reason: FinishReason::Stop,
                })
            }

            async fn health_check(&self) -> Result<(), LLMError> {
                Ok(())
            }
        }

        let chunks: Vec<_> = Fixed
            .stream_chat(&[ChatMessage::user("hi")], &ChatOptions::default())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].as_ref().unwrap(),
            &StreamChunk {
                content: "hello".into(),
                done: true
            }
        );
    }
}
