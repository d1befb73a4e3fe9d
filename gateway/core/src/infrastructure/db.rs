// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Pool
//!
//! Wraps `sqlx::postgres::PgPool` in a thin `Database` newtype that is
//! injected into the PostgreSQL repository implementations. Only built when
//! `spec.database` is present in the gateway config.

use crate::domain::gateway_config::{resolve_secret, DatabaseConfig};
use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = resolve_secret(Some(&config.url), |name| std::env::var(name).ok())
            .context("database.url is empty or points at an unset environment variable")?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self { pool })
    }

    /// Create the AI settings and usage tables when missing
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}
