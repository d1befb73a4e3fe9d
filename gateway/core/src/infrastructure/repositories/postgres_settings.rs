// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL AI Settings Repository
//!
//! `AiSettingsRepository` backed by the `ai_settings` table, one row per
//! (tenant, key). Secrets arrive here already sealed by the application
//! layer.

use crate::domain::ai_settings::AiSettings;
use crate::domain::repository::{AiSettingsRepository, RepositoryError};
use crate::domain::tenant::TenantId;
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use super::ensure_known_keys;

pub struct PostgresAiSettingsRepository {
    pool: PgPool,
}

impl PostgresAiSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AiSettingsRepository for PostgresAiSettingsRepository {
    async fn load(&self, tenant: TenantId) -> Result<AiSettings, RepositoryError> {
        let rows = sqlx::query(
            "SELECT setting_key, setting_value FROM ai_settings WHERE tenant_id = $1",
        )
        .bind(tenant.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to load AI settings: {}", e)))?;

        let mut settings = AiSettings::new();
        for row in rows {
            let key: String = row.get("setting_key");
            let value: Option<String> = row.get("setting_value");
            settings.set(key, value.unwrap_or_default());
        }
        Ok(settings)
    }

    async fn save(&self, tenant: TenantId, settings: &AiSettings) -> Result<(), RepositoryError> {
        ensure_known_keys(settings)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        for (key, value) in settings.iter() {
            sqlx::query(
                r#"
                INSERT INTO ai_settings (tenant_id, setting_key, setting_value, updated_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (tenant_id, setting_key) DO UPDATE SET
                    setting_value = EXCLUDED.setting_value,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(tenant.0)
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                RepositoryError::Database(format!("Failed to save setting '{}': {}", key, e))
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))
    }
}
