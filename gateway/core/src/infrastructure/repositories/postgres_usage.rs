// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Usage Repository
//!
//! `UsageRepository` backed by `ai_usage` (one row per request) and
//! `ai_user_limits` (per-user overrides).

use crate::domain::repository::{RepositoryError, UsageRepository};
use crate::domain::tenant::{TenantId, UserId};
use crate::domain::usage::{UsageRecord, UserLimitOverride};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;

pub struct PostgresUsageRepository {
    pool: PgPool,
}

impl PostgresUsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_limit(value: Option<i32>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

#[async_trait]
impl UsageRepository for PostgresUsageRepository {
    async fn record(&self, record: &UsageRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO ai_usage (
                tenant_id, user_id, provider, action,
                tokens_input, tokens_output, cost_usd, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.tenant_id.0)
        .bind(record.user_id.0)
        .bind(record.provider.as_str())
        .bind(&record.action)
        .bind(i32::try_from(record.input_tokens).unwrap_or(i32::MAX))
        .bind(i32::try_from(record.output_tokens).unwrap_or(i32::MAX))
        .bind(record.cost_usd)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to record usage: {}", e)))?;

        Ok(())
    }

    async fn count_since(
        &self,
        tenant: TenantId,
        user: UserId,
        since: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM ai_usage \
             WHERE tenant_id = $1 AND user_id = $2 AND created_at >= $3",
        )
        .bind(tenant.0)
        .bind(user.0)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to count usage: {}", e)))?;

        let n: i64 = row.get("n");
        Ok(u32::try_from(n).unwrap_or(u32::MAX))
    }

    async fn user_limits(
        &self,
        tenant: TenantId,
        user: UserId,
    ) -> Result<Option<UserLimitOverride>, RepositoryError> {
        let row = sqlx::query(
            "SELECT daily_limit, monthly_limit FROM ai_user_limits \
             WHERE tenant_id = $1 AND user_id = $2",
        )
        .bind(tenant.0)
        .bind(user.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to load user limits: {}", e)))?;

        Ok(row.map(|r| UserLimitOverride {
            daily: to_limit(r.get("daily_limit")),
            monthly: to_limit(r.get("monthly_limit")),
        }))
    }

    async fn set_user_limits(
        &self,
        tenant: TenantId,
        user: UserId,
        limits: UserLimitOverride,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO ai_user_limits (tenant_id, user_id, daily_limit, monthly_limit, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (tenant_id, user_id) DO UPDATE SET
                daily_limit = EXCLUDED.daily_limit,
                monthly_limit = EXCLUDED.monthly_limit,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(tenant.0)
        .bind(user.0)
        .bind(limits.daily.map(|v| i32::try_from(v).unwrap_or(i32::MAX)))
        .bind(limits.monthly.map(|v| i32::try_from(v).unwrap_or(i32::MAX)))
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save user limits: {}", e)))?;

        Ok(())
    }
}
