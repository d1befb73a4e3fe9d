// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Chat Service
//!
//! Assistant conversations for community members.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Feature and quota gates, prompt assembly, fallback chat,
//!   usage logging
//!
//! Every exchange is stored in a conversation. A request without a
//! `conversation_id` opens a new one; the model sees the most recent
//! stored turns. Turns sent by the client are only used to seed a
//! conversation that has no stored messages yet.

use crate::application::ai_service::{AiServiceError, AiServiceFactory};
use crate::application::conversations::ConversationService;
use crate::application::usage_service::UsageService;
use crate::domain::ai_settings::Feature;
use crate::domain::conversation::{Conversation, ConversationId};
use crate::domain::llm::{
    ChatMessage, ChatOptions, ChatStream, LLMError, ProviderKind, Role, StreamChunk,
};
use crate::domain::tenant::{TenantId, UserId};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Prior turns forwarded to the model
pub const MAX_HISTORY_MESSAGES: usize = 20;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    pub message: String,

    #[serde(default)]
    pub conversation_id: Option<ConversationId>,

    #[serde(default)]
    pub history: Vec<ChatMessage>,

    #[serde(default)]
    pub provider: Option<ProviderKind>,

    /// Extra context appended to the system prompt (page, listing, ...)
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemainingLimits {
    pub daily_remaining: u32,
    pub monthly_remaining: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub conversation_id: ConversationId,
    pub message_id: Option<i64>,
    pub content: String,
    pub provider: ProviderKind,
    pub model: String,
    pub used_fallback: bool,
    pub tokens_used: u32,
    pub limits: RemainingLimits,
}

pub struct ChatStreamStart {
    pub conversation_id: ConversationId,
    pub provider: ProviderKind,
    pub model: String,
    pub stream: ChatStream,
}

/// Conversation state gathered before the model is called
struct Turn {
    conversation: Conversation,
    history: Vec<ChatMessage>,
    first_turn: bool,
}

pub struct ChatService {
    ai: Arc<AiServiceFactory>,
    usage: Arc<UsageService>,
    conversations: Arc<ConversationService>,
}

impl ChatService {
    pub fn new(
        ai: Arc<AiServiceFactory>,
        usage: Arc<UsageService>,
        conversations: Arc<ConversationService>,
    ) -> Self {
        Self {
            ai,
            usage,
            conversations,
        }
    }

    /// System prompt plus context, the trimmed history, then the new user
    /// turn. System messages in the history are dropped.
    pub fn build_messages(
        system_prompt: &str,
        context: Option<&str>,
        history: &[ChatMessage],
        message: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(MAX_HISTORY_MESSAGES + 2);

        let mut system = system_prompt.trim().to_string();
        if let Some(context) = context.map(str::trim).filter(|c| !c.is_empty()) {
            if !system.is_empty() {
                system.push_str("\n\n");
            }
            system.push_str(context);
        }
        if !system.is_empty() {
            messages.push(ChatMessage::system(system));
        }

        let history: Vec<&ChatMessage> = history
            .iter()
            .filter(|m| m.role != Role::System && !m.content.trim().is_empty())
            .collect();
        let skip = history.len().saturating_sub(MAX_HISTORY_MESSAGES);
        messages.extend(history.into_iter().skip(skip).cloned());

        messages.push(ChatMessage::user(message.trim()));
        messages
    }

    fn validate(request: &ChatRequest) -> Result<(), AiServiceError> {
        if request.message.trim().is_empty() {
            return Err(AiServiceError::InvalidInput("Message is required".into()));
        }
        Ok(())
    }

    /// Load the conversation's context and store the user turn
    async fn begin_turn(
        &self,
        conversation: Conversation,
        request: &ChatRequest,
    ) -> Result<Turn, AiServiceError> {
        let stored = self
            .conversations
            .history(conversation.id, MAX_HISTORY_MESSAGES as u32)
            .await?;
        let first_turn = stored.is_empty();
        let history = if first_turn {
            request.history.clone()
        } else {
            stored
        };

        self.conversations
            .add_message(conversation.id, Role::User, request.message.trim(), 0, None)
            .await?;

        Ok(Turn {
            conversation,
            history,
            first_turn,
        })
    }

    pub async fn chat(
        &self,
        tenant: TenantId,
        user: UserId,
        request: ChatRequest,
    ) -> Result<ChatReply, AiServiceError> {
        Self::validate(&request)?;

        let resolved = self.ai.resolve(tenant).await?;
        if !resolved.enabled {
            return Err(AiServiceError::Disabled);
        }
        if !resolved.is_feature_enabled(Feature::Chat) {
            return Err(AiServiceError::FeatureDisabled(Feature::Chat));
        }
        self.usage.ensure_allowed(tenant, user, &resolved).await?;

        info!(
            "Chat request from user {} in tenant {} (provider: {})",
            user,
            tenant,
            request.provider.map(|p| p.as_str()).unwrap_or("default")
        );

        let conversation = self
            .conversations
            .open(
                tenant,
                user,
                request.conversation_id,
                request.provider.unwrap_or(resolved.default_provider),
            )
            .await?;
        let turn = self.begin_turn(conversation, &request).await?;
        let conversation_id = turn.conversation.id;
        let preferred = request.provider.or(turn.conversation.provider);

        let messages = Self::build_messages(
            &resolved.system_prompt,
            request.context.as_deref(),
            &turn.history,
            &request.message,
        );
        let result = self
            .ai
            .run_chain(&resolved, &messages, &ChatOptions::default(), preferred)
            .await?;
        let response = result.response;

        let message_id = match self
            .conversations
            .add_message(
                conversation_id,
                Role::Assistant,
                &response.content,
                response.usage.total_tokens,
                Some(&response.model),
            )
            .await
        {
            Ok(stored) => Some(stored.id),
            Err(e) => {
                warn!("Failed to store reply in conversation {}: {}", conversation_id, e);
                None
            }
        };
        if turn.first_turn {
            if let Err(e) = self
                .conversations
                .label_first_turn(
                    turn.conversation,
                    &request.message,
                    response.provider,
                    &response.model,
                )
                .await
            {
                warn!("Failed to label conversation {}: {}", conversation_id, e);
            }
        }

        let pricing = resolved.provider(response.provider).pricing;
        if let Err(e) = self
            .usage
            .record(tenant, user, response.provider, "chat", response.usage, pricing)
            .await
        {
            warn!("Failed to record chat usage: {}", e);
        }

        let limits = self.usage.check(tenant, user, resolved.limits).await?;

        Ok(ChatReply {
            conversation_id,
            message_id,
            content: response.content,
            provider: response.provider,
            model: response.model,
            used_fallback: result.used_fallback,
            tokens_used: response.usage.total_tokens,
            limits: RemainingLimits {
                daily_remaining: limits.daily_remaining,
                monthly_remaining: limits.monthly_remaining,
            },
        })
    }

    /// Open a streamed reply from a single provider; streams do not fall
    /// back. The reply is stored once the stream ends without error.
    pub async fn stream(
        &self,
        tenant: TenantId,
        user: UserId,
        request: ChatRequest,
    ) -> Result<ChatStreamStart, AiServiceError> {
        Self::validate(&request)?;

        let resolved = self.ai.resolve(tenant).await?;
        if !resolved.enabled {
            return Err(AiServiceError::Disabled);
        }
        if !resolved.is_feature_enabled(Feature::Chat) {
            return Err(AiServiceError::FeatureDisabled(Feature::Chat));
        }
        self.usage.ensure_allowed(tenant, user, &resolved).await?;

        let conversation = match request.conversation_id {
            Some(id) => Some(self.conversations.owned(tenant, user, id).await?),
            None => None,
        };
        let kind = request
            .provider
            .or(conversation.as_ref().and_then(|c| c.provider))
            .unwrap_or(resolved.default_provider);

        let provider = match self.ai.build(&resolved, kind) {
            Ok(provider) => provider,
            Err(e) => {
                warn!("Stream requested for unusable provider {} by user {}: {}", kind, user, e);
                return Err(e);
            }
        };

        let conversation = match conversation {
            Some(conversation) => conversation,
            None => self.conversations.open(tenant, user, None, kind).await?,
        };
        let turn = self.begin_turn(conversation, &request).await?;
        let conversation_id = turn.conversation.id;
        let model = provider.model().to_string();

        let messages = Self::build_messages(
            &resolved.system_prompt,
            request.context.as_deref(),
            &turn.history,
            &request.message,
        );
        let chunks = provider.stream_chat(&messages, &ChatOptions::default()).await?;

        if turn.first_turn {
            if let Err(e) = self
                .conversations
                .label_first_turn(turn.conversation, &request.message, kind, &model)
                .await
            {
                warn!("Failed to label conversation {}: {}", conversation_id, e);
            }
        }

        let pricing = resolved.provider(kind).pricing;
        if let Err(e) = self
            .usage
            .record(tenant, user, kind, "chat_stream", Default::default(), pricing)
            .await
        {
            warn!("Failed to record stream usage: {}", e);
        }

        Ok(ChatStreamStart {
            conversation_id,
            provider: kind,
            stream: self.store_reply_when_done(conversation_id, model.clone(), chunks),
            model,
        })
    }

    /// Pass chunks through and save the assembled reply after the last one
    fn store_reply_when_done(
        &self,
        conversation_id: ConversationId,
        model: String,
        chunks: ChatStream,
    ) -> ChatStream {
        // None once a chunk fails; a broken reply is not stored
        let collected = Arc::new(Mutex::new(Some(String::new())));
        let sink = collected.clone();
        let conversations = self.conversations.clone();

        let passthrough = chunks.inspect(move |item| {
            let mut text = sink.lock();
            match item {
                Ok(chunk) => {
                    if let Some(text) = text.as_mut() {
                        text.push_str(&chunk.content);
                    }
                }
                Err(_) => *text = None,
            }
        });

        let store = stream::once(async move {
            let reply = collected.lock().take();
            if let Some(reply) = reply.filter(|r| !r.is_empty()) {
                if let Err(e) = conversations
                    .add_message(conversation_id, Role::Assistant, &reply, 0, Some(&model))
                    .await
                {
                    warn!(
                        "Failed to store streamed reply in conversation {}: {}",
                        conversation_id, e
                    );
                }
            }
            None::<Result<StreamChunk, LLMError>>
        })
        .filter_map(futures::future::ready);

        Box::pin(passthrough.chain(store))
    }
}
