// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0

// Provider Factory - builds adapters from resolved settings
//
// The application layer resolves endpoint, key and model from tenant
// settings, config file and environment, then asks a factory for the
// adapter. Tests swap in their own factory to script provider behaviour.

use crate::domain::gateway_config::ModelPricing;
use crate::domain::llm::{AIProvider, LLMError, ProviderKind};
use std::sync::Arc;
use std::time::Duration;

use super::anthropic::AnthropicAdapter;
use super::gemini::GeminiAdapter;
use super::ollama::OllamaAdapter;
use super::openai::OpenAIAdapter;

/// Fully resolved settings for one provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub enabled: bool,
    pub pricing: ModelPricing,
}

impl ProviderSettings {
    /// Vendor defaults with no key
    pub fn defaults(kind: ProviderKind) -> Self {
        Self {
            kind,
            endpoint: kind.default_endpoint().to_string(),
            api_key: None,
            model: kind.default_model().to_string(),
            enabled: true,
            pricing: ModelPricing::default(),
        }
    }

    /// Whether the provider can be called at all
    pub fn is_configured(&self) -> bool {
        !self.kind.requires_api_key() || self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

pub trait ProviderFactory: Send + Sync {
    fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn AIProvider>, LLMError>;
}

/// Longest wait for a provider to accept a connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the HTTP adapters over one shared connection pool
pub struct HttpProviderFactory {
    client: reqwest::Client,
    request_timeout: Option<Duration>,
}

impl HttpProviderFactory {
    /// The shared client only bounds connecting and each read, so streamed
    /// replies may run past `request_timeout` as long as chunks keep
    /// arriving. Adapters apply `request_timeout` to whole non-streaming
    /// requests.
    pub fn new(request_timeout: Duration) -> Result<Self, LLMError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(request_timeout))
            .read_timeout(request_timeout)
            .build()
            .map_err(|e| LLMError::Provider(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            request_timeout: Some(request_timeout),
        })
    }

    /// Use a caller-built client; requests get no deadline of their own
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            request_timeout: None,
        }
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn AIProvider>, LLMError> {
        let api_key = settings.api_key.clone().unwrap_or_default();
        if settings.kind.requires_api_key() && api_key.is_empty() {
            return Err(LLMError::NotConfigured(format!(
                "{} API key is not set",
                settings.kind.display_name()
            )));
        }

        let client = self.client.clone();
        let endpoint = settings.endpoint.clone();
        let model = settings.model.clone();
        let timeout = self.request_timeout;

        let provider: Arc<dyn AIProvider> = match settings.kind {
            ProviderKind::OpenAI => Arc::new(
                OpenAIAdapter::new(client, endpoint, api_key, model).with_timeout(timeout),
            ),
            ProviderKind::Anthropic => Arc::new(
                AnthropicAdapter::new(client, endpoint, api_key, model).with_timeout(timeout),
            ),
            ProviderKind::Gemini => Arc::new(
                GeminiAdapter::new(client, endpoint, api_key, model).with_timeout(timeout),
            ),
            ProviderKind::Ollama => {
                Arc::new(OllamaAdapter::new(client, endpoint, model).with_timeout(timeout))
            }
        };

        Ok(provider)
    }
}
