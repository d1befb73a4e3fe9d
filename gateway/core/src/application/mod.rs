// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod ai_service;
pub mod chat;
pub mod content;
pub mod conversations;
pub mod repository_factory;
pub mod settings_admin;
pub mod usage_service;

pub use ai_service::{AiServiceError, AiServiceFactory, FallbackResponse, ProviderInfo};
pub use chat::{ChatReply, ChatRequest, ChatService};
pub use content::{ContentKind, ContentRequest, ContentService, GeneratedContent};
pub use conversations::ConversationService;
pub use settings_admin::SettingsAdminService;
pub use usage_service::UsageService;
