//! Postgres connection pool and schema repositories.
//!
//! Pattern adapted from doorway's `db/mongo.rs`: a thin connection wrapper
//! that fails fast on an unreachable backend, plus one repository struct per
//! entity family under `schemas/`.

pub mod schemas;

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::DbArgs;
use crate::types::GridkeepError;

/// Thin wrapper around a Postgres connection pool.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn connect(args: &DbArgs) -> Result<Self, GridkeepError> {
        info!("Connecting to Postgres");

        let pool = PgPoolOptions::new()
            .max_connections(args.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&args.database_url)
            .await
            .map_err(|e| GridkeepError::Database(format!("Failed to connect: {e}")))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| GridkeepError::Database(format!("Ping failed: {e}")))?;

        info!("Connected to Postgres");
        Ok(Self { pool })
    }

    /// Run pending migrations. Startup-fatal on failure (§7 propagation
    /// policy: malformed/unavailable schema state is a programmer error,
    /// not a runtime one).
    pub async fn migrate(&self) -> Result<(), GridkeepError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| GridkeepError::Database(format!("Migration failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
