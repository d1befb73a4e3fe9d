// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Usage Service
//!
//! Enforces per-user request quotas and records what each request cost.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Quota checks over UTC day/month windows and usage logging

use crate::application::ai_service::{AiServiceError, ResolvedAiConfig};
use crate::domain::gateway_config::ModelPricing;
use crate::domain::llm::{ProviderKind, TokenUsage};
use crate::domain::repository::{RepositoryError, UsageRepository};
use crate::domain::tenant::{TenantId, UserId};
use crate::domain::usage::{
    calculate_cost, day_start, month_start, LimitCheck, UsageLimits, UsageRecord,
    UserLimitOverride,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Clock, injectable for tests
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct UsageService {
    repository: Arc<dyn UsageRepository>,
    clock: Clock,
}

impl UsageService {
    pub fn new(repository: Arc<dyn UsageRepository>) -> Self {
        Self {
            repository,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Quota status for a user against the tenant limits
    pub async fn check(
        &self,
        tenant: TenantId,
        user: UserId,
        tenant_limits: UsageLimits,
    ) -> Result<LimitCheck, RepositoryError> {
        let now = (self.clock)();
        let user_override = self.repository.user_limits(tenant, user).await?;
        let limits = tenant_limits.with_override(user_override);

        let daily_used = self.repository.count_since(tenant, user, day_start(now)).await?;
        let monthly_used = self.repository.count_since(tenant, user, month_start(now)).await?;

        let check = LimitCheck::evaluate(limits, daily_used, monthly_used);
        debug!(
            "Usage for user {} in tenant {}: {}/{} today, {}/{} this month",
            user, tenant, daily_used, limits.daily, monthly_used, limits.monthly
        );
        Ok(check)
    }

    /// Check and turn a refusal into an error
    pub async fn ensure_allowed(
        &self,
        tenant: TenantId,
        user: UserId,
        resolved: &ResolvedAiConfig,
    ) -> Result<LimitCheck, AiServiceError> {
        let check = self.check(tenant, user, resolved.limits).await?;
        if !check.allowed {
            warn!("User {} in tenant {} over quota: {:?}", user, tenant, check.reason);
            return Err(AiServiceError::LimitExceeded(check));
        }
        Ok(check)
    }

    pub async fn record(
        &self,
        tenant: TenantId,
        user: UserId,
        provider: ProviderKind,
        action: &str,
        usage: TokenUsage,
        pricing: ModelPricing,
    ) -> Result<UsageRecord, RepositoryError> {
        let record = UsageRecord {
            tenant_id: tenant,
            user_id: user,
            provider,
            action: action.to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_usd: calculate_cost(pricing, usage),
            created_at: (self.clock)(),
        };
        self.repository.record(&record).await?;
        metrics::counter!("nexus_ai_tokens_total", "provider" => provider.as_str())
            .increment(u64::from(usage.total_tokens));
        Ok(record)
    }

    pub async fn set_user_limits(
        &self,
        tenant: TenantId,
        user: UserId,
        limits: UserLimitOverride,
    ) -> Result<(), RepositoryError> {
        self.repository.set_user_limits(tenant, user, limits).await
    }
}
