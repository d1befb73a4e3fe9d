// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Conversation
//!
//! Stored assistant conversations and their messages.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Conversation ownership, titles and context history

use crate::domain::llm::{ChatMessage, ProviderKind, Role};
use crate::domain::tenant::{TenantId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_TITLE: &str = "New Chat";

/// Longest title derived from a first message, in characters
pub const MAX_TITLE_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(skip)]
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub title: String,
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,

    /// What the chat was opened from ("general", "listing", ...)
    pub context_type: String,
    pub context_id: Option<i64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn belongs_to(&self, tenant: TenantId, user: UserId) -> bool {
        self.tenant_id == tenant && self.user_id == user
    }
}

/// Fields a caller may set when opening a conversation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewConversation {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub provider: Option<ProviderKind>,
    #[serde(default)]
    pub context_type: Option<String>,
    #[serde(default)]
    pub context_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMessage {
    pub id: i64,
    #[serde(skip)]
    pub conversation_id: ConversationId,
    pub role: Role,
    pub content: String,
    pub tokens_used: u32,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// A conversation with every message, oldest first
#[derive(Debug, Clone, Serialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<StoredMessage>,
}

/// Title shown in the conversation list, taken from the first user message
pub fn title_from_content(content: &str) -> String {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    if collapsed.chars().count() <= MAX_TITLE_CHARS {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(MAX_TITLE_CHARS).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_collapses_whitespace() {
        assert_eq!(title_from_content("  How do\n credits   work? "), "How do credits work?");
        assert_eq!(title_from_content("   "), DEFAULT_TITLE);
    }

    #[test]
    fn test_long_title_is_cut_on_char_boundary() {
        let message = "é".repeat(80);
        let title = title_from_content(&message);
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), MAX_TITLE_CHARS + 3);
    }
}
