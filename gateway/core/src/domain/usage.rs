// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Usage
//!
//! Per-user request quotas and token cost accounting.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements the daily/monthly request limits and cost model

use crate::domain::gateway_config::ModelPricing;
use crate::domain::llm::{ProviderKind, TokenUsage};
use crate::domain::tenant::{TenantId, UserId};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Request limits per user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLimits {
    #[serde(default = "default_daily_limit")]
    pub daily: u32,

    #[serde(default = "default_monthly_limit")]
    pub monthly: u32,
}

fn default_daily_limit() -> u32 {
    50
}

fn default_monthly_limit() -> u32 {
    1000
}

impl Default for UsageLimits {
    fn default() -> Self {
        Self {
            daily: default_daily_limit(),
            monthly: default_monthly_limit(),
        }
    }
}

/// Limits granted to one user, replacing the tenant defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLimitOverride {
    pub daily: Option<u32>,
    pub monthly: Option<u32>,
}

impl UsageLimits {
    pub fn with_override(self, user: Option<UserLimitOverride>) -> Self {
        match user {
            Some(o) => Self {
                daily: o.daily.unwrap_or(self.daily),
                monthly: o.monthly.unwrap_or(self.monthly),
            },
            None => self,
        }
    }
}

/// Outcome of a quota check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitCheck {
    pub allowed: bool,

    /// Why the request was refused
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub daily_used: u32,
    pub daily_limit: u32,
    pub daily_remaining: u32,
    pub monthly_used: u32,
    pub monthly_limit: u32,
    pub monthly_remaining: u32,
}

impl LimitCheck {
    pub fn evaluate(limits: UsageLimits, daily_used: u32, monthly_used: u32) -> Self {
        let daily_remaining = limits.daily.saturating_sub(daily_used);
        let monthly_remaining = limits.monthly.saturating_sub(monthly_used);

        let reason = if daily_remaining == 0 {
            Some("Daily limit reached".to_string())
        } else if monthly_remaining == 0 {
            Some("Monthly limit reached".to_string())
        } else {
            None
        };

        Self {
            allowed: reason.is_none(),
            reason,
            daily_used,
            daily_limit: limits.daily,
            daily_remaining,
            monthly_used,
            monthly_limit: limits.monthly,
            monthly_remaining,
        }
    }
}

/// One billed AI call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub provider: ProviderKind,

    /// Feature that made the call ("chat", "generate_listing", ...)
    pub action: String,

    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub created_at: DateTime<Utc>,
}

pub fn calculate_cost(pricing: ModelPricing, usage: TokenUsage) -> f64 {
    (usage.input_tokens as f64 / 1000.0) * pricing.input_per_1k
        + (usage.output_tokens as f64 / 1000.0) * pricing.output_per_1k
}

/// Start of the UTC calendar day containing `now`
pub fn day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Start of the UTC calendar month containing `now`
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_check_allows_under_quota() {
        let check = LimitCheck::evaluate(UsageLimits::default(), 10, 100);
        assert!(check.allowed);
        assert_eq!(check.reason, None);
        assert_eq!(check.daily_remaining, 40);
        assert_eq!(check.monthly_remaining, 900);
    }

    #[test]
    fn test_limit_check_daily_exhausted() {
        let check = LimitCheck::evaluate(UsageLimits { daily: 5, monthly: 100 }, 5, 20);
        assert!(!check.allowed);
        assert_eq!(check.reason.as_deref(), Some("Daily limit reached"));
        assert_eq!(check.daily_remaining, 0);
    }

    #[test]
    fn test_limit_check_monthly_exhausted() {
        let check = LimitCheck::evaluate(UsageLimits { daily: 5, monthly: 100 }, 1, 130);
        assert!(!check.allowed);
        assert_eq!(check.reason.as_deref(), Some("Monthly limit reached"));
        assert_eq!(check.monthly_remaining, 0);
    }

    #[test]
    fn test_user_override() {
        let limits = UsageLimits::default().with_override(Some(UserLimitOverride {
            daily: Some(200),
            monthly: None,
        }));
        assert_eq!(limits, UsageLimits { daily: 200, monthly: 1000 });
        assert_eq!(UsageLimits::default().with_override(None), UsageLimits::default());
    }

    #[test]
    fn test_cost() {
        let pricing = ModelPricing { input_per_1k: 0.5, output_per_1k: 1.5 };
        let cost = calculate_cost(pricing, TokenUsage::new(2000, 1000));
        assert!((cost - 2.5).abs() < 1e-9);
        assert_eq!(calculate_cost(ModelPricing::default(), TokenUsage::new(10, 10)), 0.0);
    }

    #[test]
    fn test_windows() {
        let now = Utc.with_ymd_and_hms(2026, 3, 17, 15, 42, 7).unwrap();
        assert_eq!(day_start(now), Utc.with_ymd_and_hms(2026, 3, 17, 0, 0, 0).unwrap());
        assert_eq!(month_start(now), Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
    }
}
