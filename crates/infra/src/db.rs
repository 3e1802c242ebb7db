//! Postgres connection pool lifecycle.
//!
//! The pool is process-wide: created once at startup with [`connect`], handed
//! to stores by clone (cheap, shared), and drained with [`close`] on shutdown.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::instrument;

use crate::order_store::{StoreError, map_sqlx_error};

/// DDL for every table the storefront touches.
pub const SCHEMA: &str = include_str!("../schema.sql");

/// Connection settings for the shared pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    /// Upper bound on concurrently checked-out connections.
    pub max_connections: u32,
    /// How long a caller waits for a free connection before failing.
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(3),
        }
    }
}

/// Open the shared pool. Fails fast if the database is unreachable.
#[instrument(skip(config), fields(max_connections = config.max_connections), err)]
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))?;

    tracing::info!("database pool ready");
    Ok(pool)
}

/// Create missing tables and indexes.
#[instrument(skip(pool), err)]
pub async fn apply_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("apply_schema", e))?;
    Ok(())
}

/// Wait for checked-out connections to come back, then close the pool.
pub async fn close(pool: &PgPool) {
    pool.close().await;
    tracing::info!("database pool closed");
}
