// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use nexus_ai_core::domain::gateway_config::{resolve_secret, GatewayConfigManifest};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./nexus-ai.yaml)
        #[arg(short, long, default_value = "./nexus-ai.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate {
            output,
            examples,
            force,
        } => generate(&output, examples, force),
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let manifest = GatewayConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;
    let config = &manifest.spec;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. NEXUS_AI_CONFIG_PATH: {}",
            std::env::var("NEXUS_AI_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./nexus-ai.yaml");
        println!("  4. ~/.nexus-ai/config.yaml");
        println!("  5. /etc/nexus-ai/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", manifest.metadata.name);
    println!(
        "  AI features: {}",
        if config.features.enabled { "enabled".green() } else { "disabled".red() }
    );
    println!(
        "  Chat: {}  Content generation: {}  Recommendations: {}",
        config.features.chat, config.features.content_generation, config.features.recommendations
    );
    println!();

    println!("{}", "AI Providers:".bold());
    if config.providers.is_empty() {
        println!("  {}", "(none in file; vendor defaults and environment apply)".dimmed());
    }
    for provider in &config.providers {
        let key = resolve_secret(provider.api_key.as_deref(), |name| std::env::var(name).ok());
        println!(
            "  {} {}",
            provider.kind.display_name().bold(),
            if provider.enabled { "" } else { "(disabled)" }
        );
        println!(
            "    Endpoint: {}",
            provider.endpoint.as_deref().unwrap_or(provider.kind.default_endpoint())
        );
        println!(
            "    Model: {}",
            provider.model.as_deref().unwrap_or(provider.kind.default_model())
        );
        if provider.kind.requires_api_key() {
            println!(
                "    API key: {}",
                if key.is_some() { "set".green() } else { "missing".yellow() }
            );
        }
    }
    println!();

    println!("{}", "Provider Selection:".bold());
    println!(
        "  Default provider: {}",
        config
            .selection
            .default_provider
            .map(|p| p.to_string())
            .unwrap_or_else(|| "(gemini)".to_string())
    );
    let order: Vec<String> =
        config.selection.fallback_order.iter().map(|p| p.to_string()).collect();
    println!("  Fallback order: {}", order.join(" → "));
    println!(
        "  Attempts per provider: {} (retry delay {}ms)",
        config.selection.max_attempts_per_provider, config.selection.retry_delay_ms
    );
    println!();

    println!("{}", "Limits:".bold());
    println!("  Daily: {}  Monthly: {}", config.limits.daily, config.limits.monthly);
    println!();

    println!("{}", "Storage:".bold());
    match &config.database {
        Some(_) => println!("  PostgreSQL"),
        None => println!("  In-memory"),
    }
    println!(
        "  Settings encryption: {}",
        if config.settings_key.is_some() { "on".green() } else { "off".yellow() }
    );

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let manifest = GatewayConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    manifest
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

pub fn sample_config(with_examples: bool) -> &'static str {
    if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    }
}

fn generate(output: &Path, with_examples: bool, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    std::fs::write(output, sample_config(with_examples))
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
