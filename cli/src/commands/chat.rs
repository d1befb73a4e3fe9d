// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `chat`: one message through the same path the HTTP API uses

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;

use nexus_ai_core::application::chat::ChatRequest;
use nexus_ai_core::domain::friendly_error::friendly_message;
use nexus_ai_core::domain::llm::ProviderKind;
use nexus_ai_core::domain::tenant::{TenantId, UserId};

use crate::embedded::Gateway;

#[derive(Args)]
pub struct ChatArgs {
    /// Message to send
    pub message: String,

    /// Preferred provider (default: tenant default)
    #[arg(long)]
    pub provider: Option<ProviderKind>,

    #[arg(long, default_value_t = 1)]
    pub tenant: i64,

    #[arg(long, default_value_t = 1)]
    pub user: i64,

    /// Print the reply as it is generated
    #[arg(long)]
    pub stream: bool,
}

pub async fn run(args: ChatArgs, config_path: Option<PathBuf>) -> Result<()> {
    let gateway = Gateway::new(config_path).await?;
    let tenant = TenantId(args.tenant);
    let user = UserId(args.user);
    let request = ChatRequest {
        message: args.message,
        provider: args.provider,
        ..Default::default()
    };

    if args.stream {
        let mut start = gateway.chat.stream(tenant, user, request).await?;
        let mut stdout = std::io::stdout();
        while let Some(chunk) = start.stream.next().await {
            match chunk {
                Ok(chunk) => {
                    write!(stdout, "{}", chunk.content)?;
                    stdout.flush()?;
                }
                Err(e) => {
                    println!();
                    anyhow::bail!("{} ({})", friendly_message(&e), e);
                }
            }
        }
        println!();
        println!("{}", format!("[{} / {}]", start.provider, start.model).dimmed());
        return Ok(());
    }

    let reply = gateway.chat.chat(tenant, user, request).await?;
    println!("{}", reply.content);
    let via = if reply.used_fallback { " via fallback" } else { "" };
    println!(
        "{}",
        format!(
            "[{} / {}{}, {} tokens, {} requests left today]",
            reply.provider, reply.model, via, reply.tokens_used, reply.limits.daily_remaining
        )
        .dimmed()
    );
    Ok(())
}
