// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0
//! In-process gateway services
//!
//! Builds the service graph from a gateway config. Used by `serve` and by
//! the commands that talk to providers directly.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use nexus_ai_core::{
    application::{
        ai_service::AiServiceFactory,
        chat::ChatService,
        content::ContentService,
        conversations::ConversationService,
        repository_factory::{
            create_conversation_repository, create_settings_repository, create_usage_repository,
        },
        settings_admin::SettingsAdminService,
        usage_service::UsageService,
    },
    domain::gateway_config::{resolve_secret, GatewayConfigManifest},
    infrastructure::{db::Database, llm::HttpProviderFactory, secret_box::SecretBox},
    presentation::AppState,
};

pub struct Gateway {
    pub manifest: GatewayConfigManifest,
    pub ai: Arc<AiServiceFactory>,
    pub usage: Arc<UsageService>,
    pub chat: Arc<ChatService>,
    pub conversations: Arc<ConversationService>,
    pub content: Arc<ContentService>,
    pub admin: Arc<SettingsAdminService>,
}

impl Gateway {
    pub async fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let manifest = GatewayConfigManifest::load_or_default(config_path)
            .context("Failed to load configuration")?;
        manifest
            .validate()
            .context("Configuration validation failed")?;
        Self::from_manifest(manifest).await
    }

    pub async fn from_manifest(manifest: GatewayConfigManifest) -> Result<Self> {
        let config = Arc::new(manifest.spec.clone());

        let database = match &config.database {
            Some(db_config) => {
                let db = Database::connect(db_config).await?;
                db.migrate().await?;
                info!("Using PostgreSQL for AI settings, usage and conversations");
                Some(db)
            }
            None => {
                warn!("No database configured; AI settings, usage and conversations are in memory");
                None
            }
        };

        let passphrase = resolve_secret(config.settings_key.as_deref(), |name| {
            std::env::var(name).ok()
        });
        let secrets = SecretBox::new(passphrase.as_deref());
        if !secrets.is_enabled() {
            warn!("No settings key configured; stored API keys will not be encrypted");
        }

        let settings_repo = create_settings_repository(database.as_ref());
        let usage_repo = create_usage_repository(database.as_ref());
        let conversation_repo = create_conversation_repository(database.as_ref());

        let timeout = Duration::from_secs(config.selection.request_timeout_secs);
        let providers = Arc::new(
            HttpProviderFactory::new(timeout).context("Failed to initialize AI providers")?,
        );

        let ai = Arc::new(AiServiceFactory::new(
            config,
            settings_repo.clone(),
            secrets.clone(),
            providers,
        ));
        let usage = Arc::new(UsageService::new(usage_repo));
        let conversations = Arc::new(ConversationService::new(conversation_repo));
        let chat = Arc::new(ChatService::new(ai.clone(), usage.clone(), conversations.clone()));
        let content = Arc::new(
            ContentService::new(ai.clone(), usage.clone())
                .context("Failed to load prompt templates")?,
        );
        let admin = Arc::new(SettingsAdminService::new(settings_repo, secrets));

        Ok(Self {
            manifest,
            ai,
            usage,
            chat,
            conversations,
            content,
            admin,
        })
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            ai: self.ai.clone(),
            usage: self.usage.clone(),
            chat: self.chat.clone(),
            conversations: self.conversations.clone(),
            content: self.content.clone(),
            admin: self.admin.clone(),
            start_time: Instant::now(),
        }
    }
}
