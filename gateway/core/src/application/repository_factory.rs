// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Picks PostgreSQL repositories when a database is configured and the
//! in-memory ones otherwise, keeping the domain free of storage choices.

use std::sync::Arc;

use crate::domain::repository::{AiSettingsRepository, ConversationRepository, UsageRepository};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{
    InMemoryAiSettingsRepository, InMemoryConversationRepository, InMemoryUsageRepository,
    PostgresAiSettingsRepository, PostgresConversationRepository, PostgresUsageRepository,
};

pub fn create_settings_repository(db: Option<&Database>) -> Arc<dyn AiSettingsRepository> {
    match db {
        Some(db) => Arc::new(PostgresAiSettingsRepository::new(db.get_pool().clone())),
        None => Arc::new(InMemoryAiSettingsRepository::new()),
    }
}

pub fn create_usage_repository(db: Option<&Database>) -> Arc<dyn UsageRepository> {
    match db {
        Some(db) => Arc::new(PostgresUsageRepository::new(db.get_pool().clone())),
        None => Arc::new(InMemoryUsageRepository::new()),
    }
}

pub fn create_conversation_repository(db: Option<&Database>) -> Arc<dyn ConversationRepository> {
    match db {
        Some(db) => Arc::new(PostgresConversationRepository::new(db.get_pool().clone())),
        None => Arc::new(InMemoryConversationRepository::new()),
    }
}
