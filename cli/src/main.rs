// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Nexus AI Gateway CLI
//!
//! The `nexus-ai` binary runs the AI gateway for a Nexus TimeBank
//! deployment and offers a few admin helpers around it.
//!
//! ## Commands
//!
//! - `nexus-ai serve` - Run the HTTP API
//! - `nexus-ai config show|validate|generate` - Configuration management
//! - `nexus-ai providers list|test` - Inspect provider setup for a tenant
//! - `nexus-ai chat <message>` - One-shot chat through the fallback chain

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use nexus_ai::commands::{self, ChatArgs, ConfigCommand, ProvidersCommand, ServeArgs};
use nexus_ai_core::domain::gateway_config::GatewayConfigManifest;

/// Nexus AI Gateway - AI providers for timebank communities
#[derive(Parser)]
#[command(name = "nexus-ai")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "NEXUS_AI_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// HTTP API port (overrides network.port)
    #[arg(long, global = true, env = "NEXUS_AI_PORT")]
    port: Option<u16>,

    /// HTTP API host (overrides network.bind_address)
    #[arg(long, global = true, env = "NEXUS_AI_HOST")]
    host: Option<String>,

    /// Log level (trace, debug, info, warn, error; default: config file, then info)
    #[arg(long, global = true, env = "NEXUS_AI_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (text, json; default: config file, then text)
    #[arg(long, global = true, env = "NEXUS_AI_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway HTTP API
    #[command(name = "serve")]
    Serve {
        #[command(flatten)]
        args: ServeArgs,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Provider status and connectivity
    #[command(name = "providers")]
    Providers {
        #[command(subcommand)]
        command: ProvidersCommand,
    },

    /// Send one chat message
    #[command(name = "chat")]
    Chat {
        #[command(flatten)]
        args: ChatArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal outside development
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Logging is not up yet, so a bad config file is reported later by the command itself
    let file_logging = GatewayConfigManifest::load_or_default(cli.config.clone())
        .ok()
        .and_then(|m| m.spec.observability)
        .and_then(|o| o.logging);
    let level = cli
        .log_level
        .clone()
        .or_else(|| file_logging.as_ref().map(|l| l.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let format = cli
        .log_format
        .clone()
        .or_else(|| file_logging.map(|l| l.format))
        .unwrap_or_else(|| "text".to_string());
    init_logging(&level, &format)?;

    match cli.command {
        Some(Commands::Serve { args }) => {
            commands::serve::run(args, cli.config, cli.host, cli.port).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Providers { command }) => {
            commands::providers::handle_command(command, cli.config).await
        }
        Some(Commands::Chat { args }) => commands::chat::run(args, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format.eq_ignore_ascii_case("json") {
        builder.json().with_target(true).init();
    } else {
        builder.with_target(false).compact().init();
    }

    Ok(())
}
