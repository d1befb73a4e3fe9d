// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Conversation Repository
//!
//! `ConversationRepository` backed by `ai_conversations` and `ai_messages`.
//! Messages are removed with their conversation by the foreign key cascade.

use crate::domain::conversation::{Conversation, ConversationId, NewConversation, StoredMessage};
use crate::domain::llm::{ProviderKind, Role};
use crate::domain::repository::{ConversationRepository, RepositoryError};
use crate::domain::tenant::{TenantId, UserId};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use super::conversation_labels;

const CONVERSATION_COLUMNS: &str = "id, tenant_id, user_id, title, provider, model, \
     context_type, context_id, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, tokens_used, model, created_at";

pub struct PostgresConversationRepository {
    pool: PgPool,
}

impl PostgresConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_error(action: &str) -> impl FnOnce(sqlx::Error) -> RepositoryError + '_ {
    move |e| RepositoryError::Database(format!("Failed to {}: {}", action, e))
}

fn conversation_from_row(row: &PgRow) -> Conversation {
    let provider: Option<String> = row.get("provider");
    Conversation {
        id: ConversationId(row.get("id")),
        tenant_id: TenantId(row.get("tenant_id")),
        user_id: UserId(row.get("user_id")),
        title: row.get("title"),
        // A provider name this build does not know is shown as unset
        provider: provider.and_then(|p| p.parse::<ProviderKind>().ok()),
        model: row.get("model"),
        context_type: row.get("context_type"),
        context_id: row.get("context_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn message_from_row(row: &PgRow) -> Result<StoredMessage, RepositoryError> {
    let role: String = row.get("role");
    let tokens: i32 = row.get("tokens_used");
    Ok(StoredMessage {
        id: row.get("id"),
        conversation_id: ConversationId(row.get("conversation_id")),
        role: Role::parse(&role).ok_or_else(|| {
            RepositoryError::Serialization(format!("unknown message role '{}'", role))
        })?,
        content: row.get("content"),
        tokens_used: u32::try_from(tokens).unwrap_or(0),
        model: row.get("model"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl ConversationRepository for PostgresConversationRepository {
    async fn create(
        &self,
        tenant: TenantId,
        user: UserId,
        conversation: &NewConversation,
    ) -> Result<Conversation, RepositoryError> {
        let (title, context_type) = conversation_labels(conversation);
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO ai_conversations
                (tenant_id, user_id, title, provider, context_type, context_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            CONVERSATION_COLUMNS
        ))
        .bind(tenant.0)
        .bind(user.0)
        .bind(title)
        .bind(conversation.provider.map(|p| p.as_str()))
        .bind(context_type)
        .bind(conversation.context_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("create conversation"))?;

        Ok(conversation_from_row(&row))
    }

    async fn find(
        &self,
        tenant: TenantId,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM ai_conversations WHERE id = $1 AND tenant_id = $2",
            CONVERSATION_COLUMNS
        ))
        .bind(id.0)
        .bind(tenant.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("load conversation"))?;

        Ok(row.as_ref().map(conversation_from_row))
    }

    async fn list_for_user(
        &self,
        tenant: TenantId,
        user: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM ai_conversations
            WHERE tenant_id = $1 AND user_id = $2
            ORDER BY updated_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
            CONVERSATION_COLUMNS
        ))
        .bind(tenant.0)
        .bind(user.0)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list conversations"))?;

        Ok(rows.iter().map(conversation_from_row).collect())
    }

    async fn count_for_user(&self, tenant: TenantId, user: UserId) -> Result<u64, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM ai_conversations WHERE tenant_id = $1 AND user_id = $2",
        )
        .bind(tenant.0)
        .bind(user.0)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("count conversations"))?;

        let n: i64 = row.get("n");
        Ok(u64::try_from(n).unwrap_or(0))
    }

    async fn update(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE ai_conversations
            SET title = $2, provider = $3, model = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(conversation.id.0)
        .bind(&conversation.title)
        .bind(conversation.provider.map(|p| p.as_str()))
        .bind(conversation.model.as_deref())
        .execute(&self.pool)
        .await
        .map_err(db_error("update conversation"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("conversation {}", conversation.id)));
        }
        Ok(())
    }

    async fn delete(&self, tenant: TenantId, id: ConversationId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM ai_conversations WHERE id = $1 AND tenant_id = $2")
            .bind(id.0)
            .bind(tenant.0)
            .execute(&self.pool)
            .await
            .map_err(db_error("delete conversation"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn add_message(
        &self,
        conversation: ConversationId,
        role: Role,
        content: &str,
        tokens_used: u32,
        model: Option<&str>,
    ) -> Result<StoredMessage, RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("start transaction"))?;

        let touched = sqlx::query("UPDATE ai_conversations SET updated_at = NOW() WHERE id = $1")
            .bind(conversation.0)
            .execute(&mut *tx)
            .await
            .map_err(db_error("touch conversation"))?;
        if touched.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("conversation {}", conversation)));
        }

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO ai_messages (conversation_id, role, content, tokens_used, model)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(conversation.0)
        .bind(role.as_str())
        .bind(content)
        .bind(i32::try_from(tokens_used).unwrap_or(i32::MAX))
        .bind(model)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("save message"))?;

        tx.commit().await.map_err(db_error("commit message"))?;
        message_from_row(&row)
    }

    async fn recent_messages(
        &self,
        conversation: ConversationId,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT * FROM (
                SELECT {} FROM ai_messages
                WHERE conversation_id = $1
                ORDER BY id DESC
                LIMIT $2
            ) recent
            ORDER BY id ASC
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(conversation.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("load recent messages"))?;

        rows.iter().map(message_from_row).collect()
    }

    async fn messages(
        &self,
        conversation: ConversationId,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ai_messages WHERE conversation_id = $1 ORDER BY id ASC",
            MESSAGE_COLUMNS
        ))
        .bind(conversation.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("load messages"))?;

        rows.iter().map(message_from_row).collect()
    }

    async fn count_messages(&self, conversation: ConversationId) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM ai_messages WHERE conversation_id = $1")
            .bind(conversation.0)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("count messages"))?;

        let n: i64 = row.get("n");
        Ok(u64::try_from(n).unwrap_or(0))
    }
}
