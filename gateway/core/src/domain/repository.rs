// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the stores the AI layer owns, implemented
//! in `crate::infrastructure::repositories`.
//!
//! | Trait | Data |
//! |-------|------|
//! | `AiSettingsRepository` | `AiSettings` per tenant |
//! | `UsageRepository` | `UsageRecord`, per-user limits |
//! | `ConversationRepository` | `Conversation`, `StoredMessage` |
//!
//! Each has an `InMemory*` and a `Postgres*` implementation.
//!
//! Implementations are selected at startup: PostgreSQL when `spec.database`
//! is configured, in-memory otherwise.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crate::domain::ai_settings::AiSettings;
use crate::domain::conversation::{Conversation, ConversationId, NewConversation, StoredMessage};
use crate::domain::llm::Role;
use crate::domain::tenant::{TenantId, UserId};
use crate::domain::usage::{UsageRecord, UserLimitOverride};

#[async_trait]
pub trait AiSettingsRepository: Send + Sync {
    /// All settings rows for a tenant (empty when none saved)
    async fn load(&self, tenant: TenantId) -> Result<AiSettings, RepositoryError>;

    /// Upsert the given keys, leaving other keys untouched
    async fn save(&self, tenant: TenantId, settings: &AiSettings) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait UsageRepository: Send + Sync {
    async fn record(&self, record: &UsageRecord) -> Result<(), RepositoryError>;

    /// Number of requests a user made at or after `since`
    async fn count_since(
        &self,
        tenant: TenantId,
        user: UserId,
        since: DateTime<Utc>,
    ) -> Result<u32, RepositoryError>;

    async fn user_limits(
        &self,
        tenant: TenantId,
        user: UserId,
    ) -> Result<Option<UserLimitOverride>, RepositoryError>;

    async fn set_user_limits(
        &self,
        tenant: TenantId,
        user: UserId,
        limits: UserLimitOverride,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn create(
        &self,
        tenant: TenantId,
        user: UserId,
        conversation: &NewConversation,
    ) -> Result<Conversation, RepositoryError>;

    async fn find(
        &self,
        tenant: TenantId,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    /// Most recently updated first
    async fn list_for_user(
        &self,
        tenant: TenantId,
        user: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conversation>, RepositoryError>;

    async fn count_for_user(&self, tenant: TenantId, user: UserId) -> Result<u64, RepositoryError>;

    /// Persist title, provider and model; bumps `updated_at`
    async fn update(&self, conversation: &Conversation) -> Result<(), RepositoryError>;

    /// Removes the conversation and its messages; false when it did not exist
    async fn delete(&self, tenant: TenantId, id: ConversationId) -> Result<bool, RepositoryError>;

    async fn add_message(
        &self,
        conversation: ConversationId,
        role: Role,
        content: &str,
        tokens_used: u32,
        model: Option<&str>,
    ) -> Result<StoredMessage, RepositoryError>;

    /// The last `limit` messages, oldest first
    async fn recent_messages(
        &self,
        conversation: ConversationId,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, RepositoryError>;

    async fn messages(
        &self,
        conversation: ConversationId,
    ) -> Result<Vec<StoredMessage>, RepositoryError>;

    async fn count_messages(&self, conversation: ConversationId) -> Result<u64, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown setting: {0}")]
    UnknownSetting(String),
}
