// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `serve`: run the gateway HTTP API until interrupted

use anyhow::{Context, Result};
use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use nexus_ai_core::presentation::app;

use crate::embedded::Gateway;

#[derive(Args)]
pub struct ServeArgs {
    /// Expose Prometheus metrics even when the config leaves them off
    #[arg(long)]
    pub metrics: bool,

    /// Prometheus listener port (overrides observability.metrics.port)
    #[arg(long, env = "NEXUS_AI_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

pub async fn run(
    args: ServeArgs,
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let gateway = Gateway::new(config_path).await?;
    let config = &gateway.manifest.spec;

    info!(
        "Nexus AI gateway {} starting (config: {})",
        env!("CARGO_PKG_VERSION"),
        gateway.manifest.metadata.name
    );

    let metrics = config.observability.as_ref().and_then(|o| o.metrics.as_ref());
    let metrics_enabled = args.metrics || metrics.is_some_and(|m| m.enabled);
    if metrics_enabled {
        let metrics_port = args
            .metrics_port
            .or(metrics.map(|m| m.port))
            .unwrap_or(9090);
        install_metrics_exporter(&config.network.bind_address, metrics_port)?;
    }

    let host = host.unwrap_or_else(|| config.network.bind_address.clone());
    let port = port.unwrap_or(config.network.port);
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Gateway listening on {}", addr);

    axum::serve(listener, app(gateway.app_state()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Gateway shutting down");

    Ok(())
}

fn install_metrics_exporter(bind_address: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .with_context(|| format!("Invalid metrics address {}:{}", bind_address, port))?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!("Prometheus metrics on http://{}/metrics", addr);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
