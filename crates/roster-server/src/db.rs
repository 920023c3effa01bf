//! Postgres connection pool and schema migrations

use roster_common::{Result, RosterError};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::DatabaseConfig;

/// Connect, retrying while the database comes up.
///
/// Makes `connect_retries` attempts (at least one), sleeping
/// `connect_retry_delay_secs` between them.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let attempts = config.connect_retries.max(1);
    let delay = Duration::from_secs(config.connect_retry_delay_secs);

    let mut attempt = 1;
    loop {
        let options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs));

        match options.connect(&config.url).await {
            Ok(pool) => {
                info!(attempt, "Database connection pool established");
                return Ok(pool);
            },
            Err(e) if attempt < attempts => {
                warn!(
                    attempt,
                    attempts,
                    retry_in_secs = delay.as_secs(),
                    error = %e,
                    "Database not ready, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
            Err(e) => {
                return Err(RosterError::Database(format!(
                    "Failed to connect after {} attempts: {}",
                    attempts, e
                )));
            },
        }
    }
}

/// Apply pending migrations from the workspace `migrations/` directory
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| RosterError::Database(format!("Failed to run migrations: {}", e)))?;

    info!("Database migrations completed");
    Ok(())
}
