// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Conversation Service
//!
//! Member-owned chat history: listing, reading, opening and deleting
//! conversations, and the context window fed back to the model.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Ownership checks over `ConversationRepository`

use crate::application::ai_service::AiServiceError;
use crate::domain::conversation::{
    title_from_content, Conversation, ConversationDetail, ConversationId, NewConversation,
    StoredMessage,
};
use crate::domain::llm::{ChatMessage, ProviderKind, Role};
use crate::domain::repository::ConversationRepository;
use crate::domain::tenant::{TenantId, UserId};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct ConversationPage {
    #[serde(rename = "data")]
    pub conversations: Vec<Conversation>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

pub struct ConversationService {
    repo: Arc<dyn ConversationRepository>,
}

impl ConversationService {
    pub fn new(repo: Arc<dyn ConversationRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(
        &self,
        tenant: TenantId,
        user: UserId,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<ConversationPage, AiServiceError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = offset.unwrap_or(0);
        let conversations = self.repo.list_for_user(tenant, user, limit, offset).await?;
        let total = self.repo.count_for_user(tenant, user).await?;
        Ok(ConversationPage {
            conversations,
            total,
            limit,
            offset,
        })
    }

    pub async fn create(
        &self,
        tenant: TenantId,
        user: UserId,
        conversation: &NewConversation,
    ) -> Result<Conversation, AiServiceError> {
        let created = self.repo.create(tenant, user, conversation).await?;
        debug!("Opened conversation {} for user {} in tenant {}", created.id, user, tenant);
        Ok(created)
    }

    /// The conversation when it exists and belongs to the caller. Other
    /// users' conversations are reported as missing.
    pub async fn owned(
        &self,
        tenant: TenantId,
        user: UserId,
        id: ConversationId,
    ) -> Result<Conversation, AiServiceError> {
        match self.repo.find(tenant, id).await? {
            Some(conversation) if conversation.belongs_to(tenant, user) => Ok(conversation),
            _ => Err(AiServiceError::NotFound("Conversation not found".into())),
        }
    }

    pub async fn get(
        &self,
        tenant: TenantId,
        user: UserId,
        id: ConversationId,
    ) -> Result<ConversationDetail, AiServiceError> {
        let conversation = self.owned(tenant, user, id).await?;
        let messages = self.repo.messages(id).await?;
        Ok(ConversationDetail {
            conversation,
            messages,
        })
    }

    pub async fn delete(
        &self,
        tenant: TenantId,
        user: UserId,
        id: ConversationId,
    ) -> Result<(), AiServiceError> {
        self.owned(tenant, user, id).await?;
        if !self.repo.delete(tenant, id).await? {
            return Err(AiServiceError::NotFound("Conversation not found".into()));
        }
        info!("Deleted conversation {} for user {}", id, user);
        Ok(())
    }

    /// Use the named conversation, or open a new one for this chat
    pub(crate) async fn open(
        &self,
        tenant: TenantId,
        user: UserId,
        id: Option<ConversationId>,
        provider: ProviderKind,
    ) -> Result<Conversation, AiServiceError> {
        match id {
            Some(id) => self.owned(tenant, user, id).await,
            None => {
                let new = NewConversation {
                    provider: Some(provider),
                    ..Default::default()
                };
                self.create(tenant, user, &new).await
            }
        }
    }

    /// The last `limit` stored turns as model input
    pub(crate) async fn history(
        &self,
        id: ConversationId,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, AiServiceError> {
        let recent = self.repo.recent_messages(id, limit).await?;
        Ok(recent.iter().map(StoredMessage::to_chat_message).collect())
    }

    pub(crate) async fn add_message(
        &self,
        id: ConversationId,
        role: Role,
        content: &str,
        tokens_used: u32,
        model: Option<&str>,
    ) -> Result<StoredMessage, AiServiceError> {
        Ok(self
            .repo
            .add_message(id, role, content, tokens_used, model)
            .await?)
    }

    /// Name the conversation after its first message and pin the provider
    /// that answered it
    pub(crate) async fn label_first_turn(
        &self,
        mut conversation: Conversation,
        first_message: &str,
        provider: ProviderKind,
        model: &str,
    ) -> Result<(), AiServiceError> {
        conversation.title = title_from_content(first_message);
        conversation.provider = Some(provider);
        conversation.model = Some(model.to_string());
        self.repo.update(&conversation).await?;
        Ok(())
    }

    pub fn repository(&self) -> &Arc<dyn ConversationRepository> {
        &self.repo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::InMemoryConversationRepository;

    fn service() -> ConversationService {
        ConversationService::new(Arc::new(InMemoryConversationRepository::new()))
    }

    #[tokio::test]
    async fn test_other_users_conversation_is_not_found() {
        let service = service();
        let conversation = service
            .create(TenantId(1), UserId(7), &NewConversation::default())
            .await
            .unwrap();

        let err = service.get(TenantId(1), UserId(8), conversation.id).await.unwrap_err();
        assert!(matches!(err, AiServiceError::NotFound(_)));
        let err = service.delete(TenantId(1), UserId(8), conversation.id).await.unwrap_err();
        assert!(matches!(err, AiServiceError::NotFound(_)));
        assert!(service.get(TenantId(1), UserId(7), conversation.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_clamps_page_size() {
        let service = service();
        for _ in 0..3 {
            service
                .create(TenantId(1), UserId(7), &NewConversation::default())
                .await
                .unwrap();
        }

        let page = service.list(TenantId(1), UserId(7), Some(500), None).await.unwrap();
        assert_eq!(page.limit, MAX_PAGE_SIZE);
        assert_eq!(page.total, 3);

        let page = service.list(TenantId(1), UserId(7), Some(2), Some(2)).await.unwrap();
        assert_eq!(page.conversations.len(), 1);
    }

    #[tokio::test]
    async fn test_first_turn_sets_title_and_provider() {
        let service = service();
        let conversation = service
            .open(TenantId(1), UserId(7), None, ProviderKind::Gemini)
            .await
            .unwrap();
        assert_eq!(conversation.provider, Some(ProviderKind::Gemini));

        service
            .label_first_turn(
                conversation.clone(),
                "Where can I find a plumber?",
                ProviderKind::Ollama,
                "llama3.2",
            )
            .await
            .unwrap();
        let stored = service.owned(TenantId(1), UserId(7), conversation.id).await.unwrap();
        assert_eq!(stored.title, "Where can I find a plumber?");
        assert_eq!(stored.provider, Some(ProviderKind::Ollama));
        assert_eq!(stored.model.as_deref(), Some("llama3.2"));
    }
}
