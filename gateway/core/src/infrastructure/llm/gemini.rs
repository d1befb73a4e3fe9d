// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0

// Gemini Provider Adapter
//
// Anti-Corruption Layer for the Google Generative Language API (v1beta)

use crate::domain::llm::{
    split_system, AIProvider, ChatMessage, ChatOptions, ChatResponse, FinishReason, LLMError,
    ProviderKind, Role, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{check_status, join_url, with_deadline};

pub struct GeminiAdapter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Option<Duration>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystem>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: [GeminiPartRef<'a>; 1],
}

#[derive(Serialize)]
struct GeminiPartRef<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiSystem {
    parts: [GeminiPart; 1],
}

#[derive(Serialize, Deserialize, Default)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<&'a [String]>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GeminiAdapter {
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

    fn model_path(&self) -> String {
        format!("v1beta/models/{}", self.model)
    }
}

#[async_trait]
impl AIProvider for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
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

        let request = GeminiRequest {
            contents: turns
                .iter()
                .map(|m| GeminiContent {
                    // Gemini calls the assistant "model"
                    role: if m.role == Role::Assistant { "model" } else { "user" },
                    parts: [GeminiPartRef { text: &m.content }],
                })
                .collect(),
            system_instruction: system.map(|text| GeminiSystem {
                parts: [GeminiPart { text }],
            }),
            generation_config: GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_tokens,
                stop_sequences: options.stop_sequences.as_deref(),
            },
        };

        let url = join_url(&self.endpoint, &format!("{}:generateContent", self.model_path()));
        let http = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request);
        let response = with_deadline(http, self.timeout).send().await?;
        let response = check_status(response, &self.model).await?;

        let gemini_response: GeminiResponse = response.json().await?;

        if let Some(reason) = gemini_response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone())
        {
            return Err(LLMError::ContentFilter(reason));
        }

        let candidate = gemini_response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::Provider("No response from model".into()))?;

        let finish_reason = match candidate.finish_reason.as_deref() {
            Some("MAX_TOKENS") => FinishReason::Length,
            Some("SAFETY") | Some("BLOCKLIST") | Some("PROHIBITED_CONTENT") => {
                FinishReason::ContentFilter
            }
            _ => FinishReason::Stop,
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if finish_reason == FinishReason::ContentFilter && text.is_empty() {
            return Err(LLMError::ContentFilter(
                candidate.finish_reason.unwrap_or_else(|| "SAFETY".into()),
            ));
        }

        let usage = gemini_response
            .usage_metadata
            .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count))
            .unwrap_or_default();

        Ok(ChatResponse {
            content: text,
            usage,
            provider: ProviderKind::Gemini,
            model: gemini_response.model_version.unwrap_or_else(|| self.model.clone()),
            finish_reason,
        })
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        let request = self
            .client
            .get(join_url(&self.endpoint, &self.model_path()))
            .header("x-goog-api-key", &self.api_key);
        let response = with_deadline(request, self.timeout).send().await?;
        check_status(response, &self.model).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(url: String) -> GeminiAdapter {
        GeminiAdapter::new(reqwest::Client::new(), url, "g-key".into(), "gemini-1.5-flash".into())
    }

    #[tokio::test]
    async fn test_maps_roles_and_system_instruction() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-1.5-flash:generateContent")
            .match_header("x-goog-api-key", "g-key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "contents": [
                    {"role": "user", "parts": [{"text": "Hi"}]},
                    {"role": "model", "parts": [{"text": "Hello"}]},
                    {"role": "user", "parts": [{"text": "Offer?"}]}
                ],
                "systemInstruction": {"parts": [{"text": "Be kind"}]},
                "generationConfig": {"maxOutputTokens": 100}
            })))
            .with_status(200)
            .with_body(concat!(
                r#"{"candidates":[{"content":{"parts":[{"text":"Sure"},{"text":"!"}]},"#,
                r#""finishReason":"STOP"}],"#,
                r#""usageMetadata":{"promptTokenCount":12,"candidatesTokenCount":3}}"#
            ))
            .create_async()
            .await;

        let messages = vec![
            ChatMessage::system("Be kind"),
            ChatMessage::user("Hi"),
            ChatMessage::assistant("Hello"),
            ChatMessage::user("Offer?"),
        ];
        let response = adapter(server.url())
            .chat(&messages, &ChatOptions::with_limits(0.5, 100))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "Sure!");
        assert_eq!(response.usage, TokenUsage::new(12, 3));
        assert_eq!(response.provider, ProviderKind::Gemini);
    }

    #[tokio::test]
    async fn test_blocked_prompt_is_content_filter() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-1.5-flash:generateContent")
            .with_status(200)
            .with_body(r#"{"candidates":[],"promptFeedback":{"blockReason":"SAFETY"}}"#)
            .create_async()
            .await;

        let err = adapter(server.url())
            .chat(&[ChatMessage::user("x")], &ChatOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::ContentFilter(_)));
    }

    #[tokio::test]
    async fn test_bad_key_is_authentication_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1beta/models/gemini-1.5-flash")
            .with_status(403)
            .with_body("API key not valid")
            .create_async()
            .await;

        let err = adapter(server.url()).health_check().await.unwrap_err();
        assert!(matches!(err, LLMError::Authentication(_)));
    }
}
