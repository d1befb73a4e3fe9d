// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Tenant AI Settings
//!
//! Key/value rows an administrator edits per tenant. They are the top layer
//! of configuration precedence: a non-empty value here beats the gateway
//! config file, which beats the process environment.
//!
//! API key values are stored sealed (see `infrastructure::secret_box`); this
//! module never sees plaintext keys from storage.

use crate::domain::llm::ProviderKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const AI_ENABLED: &str = "ai_enabled";
pub const AI_CHAT_ENABLED: &str = "ai_chat_enabled";
pub const AI_CONTENT_GEN_ENABLED: &str = "ai_content_gen_enabled";
pub const AI_RECOMMENDATIONS_ENABLED: &str = "ai_recommendations_enabled";
pub const AI_PROVIDER: &str = "ai_provider";
pub const AI_FALLBACK_ORDER: &str = "ai_fallback_order";
pub const OLLAMA_HOST: &str = "ollama_host";
pub const DEFAULT_DAILY_LIMIT: &str = "default_daily_limit";
pub const DEFAULT_MONTHLY_LIMIT: &str = "default_monthly_limit";
pub const AI_SYSTEM_PROMPT: &str = "ai_system_prompt";
pub const AI_WELCOME_MESSAGE: &str = "ai_welcome_message";

const MASK: &str = "••••••••";

/// Settings key holding a provider's API key, e.g. "gemini_api_key"
pub fn api_key_setting(kind: ProviderKind) -> String {
    format!("{}_api_key", kind.as_str())
}

/// Settings key holding a provider's model override, e.g. "openai_model"
pub fn model_setting(kind: ProviderKind) -> String {
    format!("{}_model", kind.as_str())
}

pub fn is_secret_key(key: &str) -> bool {
    key.ends_with("_api_key")
}

/// Every key the admin endpoint accepts
pub fn is_known_key(key: &str) -> bool {
    const FIXED: [&str; 11] = [
        AI_ENABLED,
        AI_CHAT_ENABLED,
        AI_CONTENT_GEN_ENABLED,
        AI_RECOMMENDATIONS_ENABLED,
        AI_PROVIDER,
        AI_FALLBACK_ORDER,
        OLLAMA_HOST,
        DEFAULT_DAILY_LIMIT,
        DEFAULT_MONTHLY_LIMIT,
        AI_SYSTEM_PROMPT,
        AI_WELCOME_MESSAGE,
    ];
    FIXED.contains(&key)
        || ProviderKind::ALL
            .iter()
            .any(|k| key == api_key_setting(*k) || key == model_setting(*k))
}

/// Feature areas that can be toggled independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Chat,
    ContentGeneration,
    Recommendations,
}

impl Feature {
    pub fn setting_key(&self) -> &'static str {
        match self {
            Feature::Chat => AI_CHAT_ENABLED,
            Feature::ContentGeneration => AI_CONTENT_GEN_ENABLED,
            Feature::Recommendations => AI_RECOMMENDATIONS_ENABLED,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Feature::Chat => "chat",
            Feature::ContentGeneration => "content_generation",
            Feature::Recommendations => "recommendations",
        };
        f.write_str(name)
    }
}

/// Raw settings for one tenant as stored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AiSettings {
    values: BTreeMap<String, String>,
}

impl AiSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Non-empty value for a key; empty rows never override lower layers
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.values.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| match v.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn get_provider(&self, key: &str) -> Option<ProviderKind> {
        self.get(key).and_then(|v| ProviderKind::from_str(v).ok())
    }

    /// Comma-separated provider list; unknown entries are dropped
    pub fn get_provider_list(&self, key: &str) -> Option<Vec<ProviderKind>> {
        self.get(key).map(|v| {
            v.split(',')
                .filter_map(|item| ProviderKind::from_str(item).ok())
                .collect()
        })
    }

    /// Copy safe to show an administrator: API keys reduced to a mask plus
    /// their last four characters
    pub fn masked(&self, reveal_tail: impl Fn(&str) -> Option<String>) -> BTreeMap<String, String> {
        self.values
            .iter()
            .map(|(k, v)| {
                let shown = if is_secret_key(k) && !v.is_empty() {
                    mask_secret(reveal_tail(v).as_deref())
                } else {
                    v.clone()
                };
                (k.clone(), shown)
            })
            .collect()
    }
}

/// Mask for a secret; `plaintext` is the decrypted key when available
pub fn mask_secret(plaintext: Option<&str>) -> String {
    match plaintext {
        Some(p) if p.chars().count() > 8 => {
            let skip = p.chars().count() - 4;
            let tail: String = p.chars().skip(skip).collect();
            format!("{}{}", MASK, tail)
        }
        _ => MASK.to_string(),
    }
}

/// Whether an incoming admin value is a mask echoed back unchanged
pub fn is_masked_value(value: &str) -> bool {
    value.starts_with(MASK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values_are_absent() {
        let settings = AiSettings::from_pairs([("ai_provider", "  "), ("openai_model", "gpt-4o")]);
        assert_eq!(settings.get("ai_provider"), None);
        assert_eq!(settings.get("openai_model"), Some("gpt-4o"));
    }

    #[test]
    fn test_typed_getters() {
        let settings = AiSettings::from_pairs([
            ("ai_enabled", "0"),
            ("ai_chat_enabled", "yes"),
            ("default_daily_limit", "25"),
            ("ai_provider", "Anthropic"),
            ("ai_fallback_order", "ollama, openai,bogus"),
        ]);
        assert_eq!(settings.get_bool(AI_ENABLED), Some(false));
        assert_eq!(settings.get_bool(AI_CHAT_ENABLED), Some(true));
        assert_eq!(settings.get_u32(DEFAULT_DAILY_LIMIT), Some(25));
        assert_eq!(settings.get_provider(AI_PROVIDER), Some(ProviderKind::Anthropic));
        assert_eq!(
            settings.get_provider_list(AI_FALLBACK_ORDER),
            Some(vec![ProviderKind::Ollama, ProviderKind::OpenAI])
        );
    }

    #[test]
    fn test_known_keys() {
        assert!(is_known_key("gemini_api_key"));
        assert!(is_known_key("ollama_model"));
        assert!(is_known_key(AI_WELCOME_MESSAGE));
        assert!(!is_known_key("site_name"));
    }

    #[test]
    fn test_masking() {
        let settings = AiSettings::from_pairs([
            ("openai_api_key", "sealed-blob"),
            ("openai_model", "gpt-4o"),
        ]);
        let masked = settings.masked(|_| Some("sk-abcdefghijWXYZ".to_string()));
        assert_eq!(masked["openai_api_key"], "••••••••WXYZ");
        assert_eq!(masked["openai_model"], "gpt-4o");
        assert!(is_masked_value(&masked["openai_api_key"]));
        assert_eq!(mask_secret(Some("short")), MASK);
        assert_eq!(mask_secret(None), MASK);
    }
}
