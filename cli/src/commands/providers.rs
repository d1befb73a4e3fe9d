// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Provider commands
//!
//! Commands: list, test

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use nexus_ai_core::domain::llm::ProviderKind;
use nexus_ai_core::domain::tenant::TenantId;

use crate::embedded::Gateway;

#[derive(Subcommand)]
pub enum ProvidersCommand {
    /// Show every provider as resolved for a tenant
    List {
        /// Tenant whose settings apply
        #[arg(long, default_value_t = 1)]
        tenant: i64,
    },

    /// Send a short prompt to one provider
    Test {
        /// gemini, openai, anthropic or ollama
        provider: ProviderKind,

        #[arg(long, default_value_t = 1)]
        tenant: i64,
    },
}

pub async fn handle_command(command: ProvidersCommand, config_path: Option<PathBuf>) -> Result<()> {
    let gateway = Gateway::new(config_path).await?;
    match command {
        ProvidersCommand::List { tenant } => list(&gateway, TenantId(tenant)).await,
        ProvidersCommand::Test { provider, tenant } => {
            test(&gateway, TenantId(tenant), provider).await
        }
    }
}

async fn list(gateway: &Gateway, tenant: TenantId) -> Result<()> {
    let resolved = gateway
        .ai
        .resolve(tenant)
        .await
        .context("Failed to resolve AI settings")?;
    let providers = gateway
        .ai
        .available_providers(tenant)
        .await
        .context("Failed to list providers")?;
    let chain = resolved.chain(None);

    println!("{}", format!("AI providers for tenant {}:", tenant).bold());
    for info in &providers {
        let status = if !info.enabled {
            "disabled".dimmed()
        } else if info.configured {
            "configured".green()
        } else {
            "missing API key".yellow()
        };
        let marker = if info.is_default { " (default)" } else { "" };
        println!("  {}{} - {} [{}]", info.name.bold(), marker, info.model, status);
    }
    println!();

    if chain.is_empty() {
        println!("{}", "No provider can serve requests".red());
    } else {
        let order: Vec<&str> = chain.iter().map(|k| k.as_str()).collect();
        println!("Fallback chain: {}", order.join(" → "));
    }
    if !resolved.enabled {
        println!("{}", "AI features are disabled for this tenant".yellow());
    }

    Ok(())
}

async fn test(gateway: &Gateway, tenant: TenantId, kind: ProviderKind) -> Result<()> {
    println!("Testing {}...", kind.display_name());
    let result = gateway
        .ai
        .test_provider(tenant, kind)
        .await
        .context("Provider test failed to run")?;

    if result.success {
        println!(
            "{}",
            format!("✓ {} ({}, {}ms)", result.message, result.model, result.latency_ms).green()
        );
        Ok(())
    } else {
        println!("{}", format!("✗ {}", result.message).red());
        anyhow::bail!("{} is not working", kind.display_name())
    }
}
