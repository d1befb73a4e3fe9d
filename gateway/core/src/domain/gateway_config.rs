// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0

// Gateway Configuration Types
//
// Static configuration for the AI gateway, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - AI provider credentials, endpoints, models and pricing
// - Provider selection: default provider, fallback order, retry budget
// - Feature toggles, usage limits and prompts
// - Database, network and observability settings
//
// Tenant database settings sit on top of this file; environment variables
// sit below it (see application::ai_service for the merge).

use crate::domain::llm::ProviderKind;
use crate::domain::usage::UsageLimits;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub const API_VERSION: &str = "nexus.timebank/v1";
pub const KIND: &str = "AiGatewayConfig";

/// Top-level Kubernetes-style gateway configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfigManifest {
    /// API version (must be "nexus.timebank/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "AiGatewayConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Gateway configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// AI provider configurations
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Default provider, fallback order and retry budget
    #[serde(default)]
    pub selection: ProviderSelection,

    #[serde(default)]
    pub features: FeatureFlags,

    /// Per-user request limits applied when the tenant sets none
    #[serde(default)]
    pub limits: UsageLimits,

    #[serde(default)]
    pub prompts: PromptConfig,

    /// Tenant settings and usage persistence (in-memory when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,

    /// Passphrase sealing API keys stored in tenant settings
    /// (supports "env:VAR_NAME")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings_key: Option<String>,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider type
    #[serde(rename = "type")]
    pub kind: ProviderKind,

    /// API endpoint URL (vendor default when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// API key (supports "env:VAR_NAME" for environment variables)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model identifier for the provider API (vendor default when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Whether this provider takes part in selection and fallback
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub pricing: ModelPricing,
}

/// USD per 1,000 tokens (0.0 for local models)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(default)]
    pub input_per_1k: f64,

    #[serde(default)]
    pub output_per_1k: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSelection {
    /// Provider used when the caller expresses no preference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<ProviderKind>,

    /// Providers tried after the preferred one, in order
    #[serde(default = "default_fallback_order")]
    pub fallback_order: Vec<ProviderKind>,

    /// Attempts against one provider before moving on (transient errors only)
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_provider: u32,

    /// Base delay between attempts on the same provider
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Master switch for every AI feature
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub chat: bool,

    #[serde(default = "default_true")]
    pub content_generation: bool,

    #[serde(default = "default_true")]
    pub recommendations: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub welcome_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string (supports "env:VAR_NAME")
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network bind address (e.g. "0.0.0.0" or "127.0.0.1")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP API port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prometheus scrape port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_fallback_order() -> Vec<ProviderKind> {
    ProviderKind::ALL.to_vec()
}

fn default_max_attempts() -> u32 {
    1
}

fn default_retry_delay() -> u64 {
    500
}

fn default_request_timeout() -> u64 {
    60
}

fn default_max_connections() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ProviderSelection {
    fn default() -> Self {
        Self {
            default_provider: None,
            fallback_order: default_fallback_order(),
            max_attempts_per_provider: default_max_attempts(),
            retry_delay_ms: default_retry_delay(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enabled: true,
            chat: true,
            content_generation: true,
            recommendations: true,
        }
    }
}

impl Default for GatewayConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "nexus-ai".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: GatewayConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Static configuration block for one provider, if present
    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.kind == kind)
    }
}

/// Resolve a config value that may point at an environment variable
/// ("env:VAR_NAME"). Unset variables resolve to `None`.
pub fn resolve_secret<F>(value: Option<&str>, env: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Some(v) if v.starts_with("env:") => {
            let var_name = &v["env:".len()..];
            let resolved = env(var_name).filter(|s| !s.is_empty());
            if resolved.is_none() {
                tracing::debug!("Environment variable not set: {}", var_name);
            }
            resolved
        }
        Some(v) if !v.is_empty() => Some(v.to_string()),
        _ => None,
    }
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl GatewayConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. NEXUS_AI_CONFIG_PATH environment variable
    /// 2. ./nexus-ai.yaml (working directory)
    /// 3. ~/.nexus-ai/config.yaml (user home)
    /// 4. /etc/nexus-ai/config.yaml (system, Unix) or C:\ProgramData\NexusAI\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("NEXUS_AI_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./nexus-ai.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".nexus-ai").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/nexus-ai/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\NexusAI\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let env = |name: &str| std::env::var(name).ok();

        // Explicit CLI path (fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides(env);
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides(env);
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides(env);
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    /// so container deployments can adjust the file without editing it
    pub fn apply_env_overrides<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = env("NEXUS_AI_ENABLED") {
            match parse_bool(&val) {
                Some(enabled) => {
                    tracing::info!("Environment override: NEXUS_AI_ENABLED={}", enabled);
                    self.spec.features.enabled = enabled;
                }
                None => tracing::warn!(
                    "Invalid value for NEXUS_AI_ENABLED: '{}'. Expected true/false. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = env("NEXUS_AI_DEFAULT_PROVIDER") {
            match val.parse::<ProviderKind>() {
                Ok(kind) => {
                    tracing::info!("Environment override: NEXUS_AI_DEFAULT_PROVIDER={}", kind);
                    self.spec.selection.default_provider = Some(kind);
                }
                Err(e) => tracing::warn!("Ignoring NEXUS_AI_DEFAULT_PROVIDER: {}", e),
            }
        }

        if let Some(url) = env("NEXUS_AI_DATABASE_URL").filter(|u| !u.is_empty()) {
            tracing::info!("Environment override: NEXUS_AI_DATABASE_URL");
            match self.spec.database.as_mut() {
                Some(db) => db.url = url,
                None => {
                    self.spec.database = Some(DatabaseConfig {
                        url,
                        max_connections: default_max_connections(),
                    })
                }
            }
        }

        if let Some(key) = env("NEXUS_AI_SETTINGS_KEY").filter(|k| !k.is_empty()) {
            tracing::info!("Environment override: NEXUS_AI_SETTINGS_KEY");
            self.spec.settings_key = Some(key);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let spec = &self.spec;

        let mut seen = HashSet::new();
        for provider in &spec.providers {
            if !seen.insert(provider.kind) {
                anyhow::bail!("Provider '{}' is configured more than once", provider.kind);
            }

            if let Some(endpoint) = &provider.endpoint {
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                    anyhow::bail!(
                        "Provider '{}' endpoint must be an http(s) URL: {}",
                        provider.kind,
                        endpoint
                    );
                }
            }

            if matches!(&provider.model, Some(m) if m.trim().is_empty()) {
                anyhow::bail!("Model identifier cannot be empty for provider: {}", provider.kind);
            }

            if provider.pricing.input_per_1k < 0.0 || provider.pricing.output_per_1k < 0.0 {
                anyhow::bail!("Pricing cannot be negative for provider: {}", provider.kind);
            }
        }

        if let Some(default_provider) = spec.selection.default_provider {
            if matches!(spec.provider(default_provider), Some(p) if !p.enabled) {
                anyhow::bail!("Default provider '{}' is disabled", default_provider);
            }
        }

        let mut seen = HashSet::new();
        for kind in &spec.selection.fallback_order {
            if !seen.insert(*kind) {
                anyhow::bail!("Fallback order lists '{}' more than once", kind);
            }
        }

        if spec.selection.max_attempts_per_provider == 0 {
            anyhow::bail!("selection.max_attempts_per_provider must be at least 1");
        }

        if spec.selection.request_timeout_secs == 0 {
            anyhow::bail!("selection.request_timeout_secs must be at least 1");
        }

        if spec.limits.daily == 0 || spec.limits.monthly == 0 {
            anyhow::bail!("Usage limits must be greater than zero");
        }

        if let Some(db) = &spec.database {
            if db.url.is_empty() {
                anyhow::bail!("database.url cannot be empty");
            }
        }

        Ok(())
    }
}
