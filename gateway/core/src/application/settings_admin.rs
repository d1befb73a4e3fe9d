// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Admin view and update of tenant AI settings.
//!
//! Reads hand back API keys masked; writes seal new keys and ignore masks
//! echoed back by the admin form.

use crate::application::ai_service::AiServiceError;
use crate::domain::ai_settings::{self, is_known_key, is_masked_value, is_secret_key, AiSettings};
use crate::domain::llm::ProviderKind;
use crate::domain::repository::AiSettingsRepository;
use crate::domain::tenant::TenantId;
use crate::infrastructure::secret_box::SecretBox;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

pub struct SettingsAdminService {
    repository: Arc<dyn AiSettingsRepository>,
    secrets: SecretBox,
}

fn check_value(key: &str, value: &str) -> Result<(), AiServiceError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(());
    }
    let invalid = |what: &str| AiServiceError::InvalidInput(format!("{} must be {}", key, what));
    match key {
        ai_settings::AI_PROVIDER => ProviderKind::from_str(value)
            .map(|_| ())
            .map_err(|_| invalid("one of gemini, openai, anthropic, ollama")),
        ai_settings::AI_FALLBACK_ORDER => value
            .split(',')
            .try_for_each(|item| ProviderKind::from_str(item).map(|_| ()))
            .map_err(|_| invalid("a comma-separated list of providers")),
        ai_settings::DEFAULT_DAILY_LIMIT | ai_settings::DEFAULT_MONTHLY_LIMIT => value
            .parse::<u32>()
            .map(|_| ())
            .map_err(|_| invalid("a non-negative integer")),
        ai_settings::OLLAMA_HOST
            if !(value.starts_with("http://") || value.starts_with("https://")) =>
        {
            Err(invalid("an http(s) URL"))
        }
        _ => Ok(()),
    }
}

impl SettingsAdminService {
    pub fn new(repository: Arc<dyn AiSettingsRepository>, secrets: SecretBox) -> Self {
        Self { repository, secrets }
    }

    pub async fn masked(
        &self,
        tenant: TenantId,
    ) -> Result<BTreeMap<String, String>, AiServiceError> {
        let stored = self.repository.load(tenant).await?;
        Ok(stored.masked(|v| self.secrets.open(v).ok()))
    }

    /// Save the given keys; returns how many rows were written
    pub async fn update(
        &self,
        tenant: TenantId,
        updates: BTreeMap<String, String>,
    ) -> Result<usize, AiServiceError> {
        let mut to_save = AiSettings::new();
        for (key, value) in updates {
            if !is_known_key(&key) {
                return Err(AiServiceError::InvalidInput(format!("Unknown setting: {}", key)));
            }
            if is_secret_key(&key) {
                if is_masked_value(&value) {
                    continue;
                }
                let value = value.trim();
                let stored = if value.is_empty() {
                    String::new()
                } else {
                    self.secrets.seal(value)?
                };
                to_save.set(key, stored);
                continue;
            }
            check_value(&key, &value)?;
            to_save.set(key, value.trim().to_string());
        }

        let count = to_save.iter().count();
        if count > 0 {
            self.repository.save(tenant, &to_save).await?;
            info!("Updated {} AI settings for tenant {}", count, tenant);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::InMemoryAiSettingsRepository;

    fn service() -> (SettingsAdminService, Arc<InMemoryAiSettingsRepository>) {
        let repo = Arc::new(InMemoryAiSettingsRepository::new());
        (SettingsAdminService::new(repo.clone(), SecretBox::new(Some("admin-test"))), repo)
    }

    fn updates(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[tokio::test]
    async fn test_keys_sealed_at_rest_and_masked_on_read() {
        let (svc, repo) = service();
        svc.update(TenantId(1), updates(&[("openai_api_key", "sk-abcdefghijkl1234")]))
            .await
            .unwrap();

        let raw = repo.load(TenantId(1)).await.unwrap();
        assert!(SecretBox::is_sealed(raw.get("openai_api_key").unwrap()));

        let masked = svc.masked(TenantId(1)).await.unwrap();
        let shown = &masked["openai_api_key"];
        assert!(shown.ends_with("1234"));
        assert!(!shown.contains("sk-abc"));
    }

    #[tokio::test]
    async fn test_echoed_mask_keeps_existing_key() {
        let (svc, repo) = service();
        svc.update(TenantId(1), updates(&[("gemini_api_key", "AIza-original-key")])).await.unwrap();
        let before = repo.load(TenantId(1)).await.unwrap();

        let masked = svc.masked(TenantId(1)).await.unwrap();
        let written = svc
            .update(
                TenantId(1),
                updates(&[
                    ("gemini_api_key", &masked["gemini_api_key"]),
                    ("ai_provider", "gemini"),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(written, 1);
        let after = repo.load(TenantId(1)).await.unwrap();
        assert_eq!(before.get("gemini_api_key"), after.get("gemini_api_key"));
    }

    #[tokio::test]
    async fn test_rejects_bad_values() {
        let (svc, _) = service();
        assert!(svc.update(TenantId(1), updates(&[("ai_provider", "watson")])).await.is_err());
        assert!(svc.update(TenantId(1), updates(&[("default_daily_limit", "-3")])).await.is_err());
        assert!(svc.update(TenantId(1), updates(&[("not_a_setting", "x")])).await.is_err());
        let order = updates(&[("ai_fallback_order", "openai,ollama")]);
        assert!(svc.update(TenantId(1), order).await.is_ok());
    }
}
