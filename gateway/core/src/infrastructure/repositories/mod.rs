// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist tenant AI settings, usage records and conversations
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **PostgresAiSettingsRepository** / **PostgresUsageRepository** - backed
//!   by the `ai_settings`, `ai_usage` and `ai_user_limits` tables
//! - **PostgresConversationRepository** - `ai_conversations` and `ai_messages`
//! - **InMemory\*Repository** - used when no database is configured, and in
//!   tests

pub mod postgres_conversation;
pub mod postgres_settings;
pub mod postgres_usage;

pub use postgres_conversation::PostgresConversationRepository;
pub use postgres_settings::PostgresAiSettingsRepository;
pub use postgres_usage::PostgresUsageRepository;

use crate::domain::ai_settings::{is_known_key, AiSettings};
use crate::domain::conversation::{
    Conversation, ConversationId, NewConversation, StoredMessage, DEFAULT_TITLE,
};
use crate::domain::llm::Role;
use crate::domain::repository::{
    AiSettingsRepository, ConversationRepository, RepositoryError, UsageRepository,
};
use crate::domain::tenant::{TenantId, UserId};
use crate::domain::usage::{UsageRecord, UserLimitOverride};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub(crate) fn ensure_known_keys(settings: &AiSettings) -> Result<(), RepositoryError> {
    match settings.iter().find(|(k, _)| !is_known_key(k)) {
        Some((key, _)) => Err(RepositoryError::UnknownSetting(key.clone())),
        None => Ok(()),
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAiSettingsRepository {
    settings: Arc<RwLock<HashMap<TenantId, AiSettings>>>,
}

impl InMemoryAiSettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AiSettingsRepository for InMemoryAiSettingsRepository {
    async fn load(&self, tenant: TenantId) -> Result<AiSettings, RepositoryError> {
        Ok(self.settings.read().get(&tenant).cloned().unwrap_or_default())
    }

    async fn save(&self, tenant: TenantId, settings: &AiSettings) -> Result<(), RepositoryError> {
        ensure_known_keys(settings)?;
        let mut all = self.settings.write();
        let stored = all.entry(tenant).or_default();
        for (key, value) in settings.iter() {
            stored.set(key.clone(), value.clone());
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryUsageRepository {
    records: Arc<RwLock<Vec<UsageRecord>>>,
    limits: Arc<RwLock<HashMap<(TenantId, UserId), UserLimitOverride>>>,
}

impl InMemoryUsageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.read().clone()
    }
}

#[async_trait]
impl UsageRepository for InMemoryUsageRepository {
    async fn record(&self, record: &UsageRecord) -> Result<(), RepositoryError> {
        self.records.write().push(record.clone());
        Ok(())
    }

    async fn count_since(
        &self,
        tenant: TenantId,
        user: UserId,
        since: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        let count = self
            .records
            .read()
            .iter()
            .filter(|r| r.tenant_id == tenant && r.user_id == user && r.created_at >= since)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn user_limits(
        &self,
        tenant: TenantId,
        user: UserId,
    ) -> Result<Option<UserLimitOverride>, RepositoryError> {
        Ok(self.limits.read().get(&(tenant, user)).copied())
    }

    async fn set_user_limits(
        &self,
        tenant: TenantId,
        user: UserId,
        limits: UserLimitOverride,
    ) -> Result<(), RepositoryError> {
        self.limits.write().insert((tenant, user), limits);
        Ok(())
    }
}

#[derive(Default)]
struct ConversationStore {
    next_conversation: i64,
    next_message: i64,
    conversations: BTreeMap<ConversationId, Conversation>,
    messages: Vec<StoredMessage>,
}

#[derive(Clone, Default)]
pub struct InMemoryConversationRepository {
    store: Arc<RwLock<ConversationStore>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn blank_to_none(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Title and context type with their defaults applied
pub(crate) fn conversation_labels(conversation: &NewConversation) -> (String, String) {
    (
        blank_to_none(conversation.title.as_deref())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        blank_to_none(conversation.context_type.as_deref())
            .unwrap_or_else(|| "general".to_string()),
    )
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn create(
        &self,
        tenant: TenantId,
        user: UserId,
        conversation: &NewConversation,
    ) -> Result<Conversation, RepositoryError> {
        let (title, context_type) = conversation_labels(conversation);
        let mut store = self.store.write();
        store.next_conversation += 1;
        let now = Utc::now();
        let created = Conversation {
            id: ConversationId(store.next_conversation),
            tenant_id: tenant,
            user_id: user,
            title,
            provider: conversation.provider,
            model: None,
            context_type,
            context_id: conversation.context_id,
            created_at: now,
            updated_at: now,
        };
        store.conversations.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find(
        &self,
        tenant: TenantId,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self
            .store
            .read()
            .conversations
            .get(&id)
            .filter(|c| c.tenant_id == tenant)
            .cloned())
    }

    async fn list_for_user(
        &self,
        tenant: TenantId,
        user: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let store = self.store.read();
        let mut owned: Vec<Conversation> = store
            .conversations
            .values()
            .filter(|c| c.belongs_to(tenant, user))
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(owned
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_for_user(&self, tenant: TenantId, user: UserId) -> Result<u64, RepositoryError> {
        let store = self.store.read();
        let count = store
            .conversations
            .values()
            .filter(|c| c.belongs_to(tenant, user))
            .count();
        Ok(count as u64)
    }

    async fn update(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let mut store = self.store.write();
        match store.conversations.get_mut(&conversation.id) {
            Some(existing) => {
                existing.title = conversation.title.clone();
                existing.provider = conversation.provider;
                existing.model = conversation.model.clone();
                existing.updated_at = Utc::now();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!(
                "conversation {}",
                conversation.id
            ))),
        }
    }

    async fn delete(&self, tenant: TenantId, id: ConversationId) -> Result<bool, RepositoryError> {
        let mut store = self.store.write();
        if !store.conversations.get(&id).is_some_and(|c| c.tenant_id == tenant) {
            return Ok(false);
        }
        store.conversations.remove(&id);
        store.messages.retain(|m| m.conversation_id != id);
        Ok(true)
    }

    async fn add_message(
        &self,
        conversation: ConversationId,
        role: Role,
        content: &str,
        tokens_used: u32,
        model: Option<&str>,
    ) -> Result<StoredMessage, RepositoryError> {
        let mut store = self.store.write();
        let now = Utc::now();
        match store.conversations.get_mut(&conversation) {
            Some(existing) => existing.updated_at = now,
            None => {
                return Err(RepositoryError::NotFound(format!("conversation {}", conversation)))
            }
        }
        store.next_message += 1;
        let message = StoredMessage {
            id: store.next_message,
            conversation_id: conversation,
            role,
            content: content.to_string(),
            tokens_used,
            model: model.map(str::to_string),
            created_at: now,
        };
        store.messages.push(message.clone());
        Ok(message)
    }

    async fn recent_messages(
        &self,
        conversation: ConversationId,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let all = self.messages(conversation).await?;
        let skip = all.len().saturating_sub(limit as usize);
        Ok(all.into_iter().skip(skip).collect())
    }

    async fn messages(
        &self,
        conversation: ConversationId,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        Ok(self
            .store
            .read()
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation)
            .cloned()
            .collect())
    }

    async fn count_messages(&self, conversation: ConversationId) -> Result<u64, RepositoryError> {
        let store = self.store.read();
        let count = store
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation)
            .count();
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::ProviderKind;
    use chrono::Duration;

    fn record(tenant: i64, user: i64, at: DateTime<Utc>) -> UsageRecord {
        UsageRecord {
            tenant_id: TenantId(tenant),
            user_id: UserId(user),
            provider: ProviderKind::Ollama,
            action: "chat".into(),
            input_tokens: 1,
            output_tokens: 1,
            cost_usd: 0.0,
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_settings_save_merges_keys_per_tenant() {
        let repo = InMemoryAiSettingsRepository::new();
        repo.save(TenantId(1), &AiSettings::from_pairs([("ai_provider", "openai")])).await.unwrap();
        repo.save(TenantId(1), &AiSettings::from_pairs([("ai_enabled", "1")])).await.unwrap();

        let loaded = repo.load(TenantId(1)).await.unwrap();
        assert_eq!(loaded.get("ai_provider"), Some("openai"));
        assert_eq!(loaded.get("ai_enabled"), Some("1"));
        assert!(repo.load(TenantId(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_settings_reject_unknown_key() {
        let repo = InMemoryAiSettingsRepository::new();
        let err = repo
            .save(TenantId(1), &AiSettings::from_pairs([("favourite_colour", "blue")]))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::UnknownSetting(k) if k == "favourite_colour"));
    }

    #[tokio::test]
    async fn test_usage_count_is_scoped_and_windowed() {
        let repo = InMemoryUsageRepository::new();
        let now = Utc::now();
        repo.record(&record(1, 7, now)).await.unwrap();
        repo.record(&record(1, 7, now - Duration::days(40))).await.unwrap();
        repo.record(&record(1, 8, now)).await.unwrap();
        repo.record(&record(2, 7, now)).await.unwrap();

        let since = now - Duration::days(1);
        assert_eq!(repo.count_since(TenantId(1), UserId(7), since).await.unwrap(), 1);
        assert_eq!(repo.records().len(), 4);
    }

    #[tokio::test]
    async fn test_user_limits_roundtrip() {
        let repo = InMemoryUsageRepository::new();
        assert!(repo.user_limits(TenantId(1), UserId(1)).await.unwrap().is_none());

        let limits = UserLimitOverride { daily: Some(5), monthly: None };
        repo.set_user_limits(TenantId(1), UserId(1), limits).await.unwrap();
        assert_eq!(repo.user_limits(TenantId(1), UserId(1)).await.unwrap(), Some(limits));
    }

    #[tokio::test]
    async fn test_conversations_are_scoped_to_tenant_and_user() {
        let repo = InMemoryConversationRepository::new();
        let mine = repo
            .create(TenantId(1), UserId(7), &NewConversation::default())
            .await
            .unwrap();
        repo.create(TenantId(1), UserId(8), &NewConversation::default()).await.unwrap();
        repo.create(TenantId(2), UserId(7), &NewConversation::default()).await.unwrap();

        assert_eq!(mine.title, "New Chat");
        assert_eq!(mine.context_type, "general");
        assert_eq!(repo.count_for_user(TenantId(1), UserId(7)).await.unwrap(), 1);
        assert!(repo.find(TenantId(2), mine.id).await.unwrap().is_none());
        assert!(!repo.delete(TenantId(2), mine.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_recent_messages_keep_order_and_limit() {
        let repo = InMemoryConversationRepository::new();
        let conversation = repo
            .create(TenantId(1), UserId(7), &NewConversation::default())
            .await
            .unwrap();
        for i in 0..5 {
            repo.add_message(conversation.id, Role::User, &format!("m{}", i), 0, None)
                .await
                .unwrap();
        }

        let recent = repo.recent_messages(conversation.id, 2).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);
        assert_eq!(repo.count_messages(conversation.id).await.unwrap(), 5);

        assert!(repo.delete(TenantId(1), conversation.id).await.unwrap());
        assert_eq!(repo.count_messages(conversation.id).await.unwrap(), 0);
        assert!(repo
            .add_message(conversation.id, Role::User, "late", 0, None)
            .await
            .is_err());
    }
}
