// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Database connection and migration bootstrap (`spec.md` §4.2 Schema
//! Version Gate). Connection acquisition retries with exponential backoff,
//! matching the retry requirement in `spec.md` §4.1.

use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::{debug, info, warn};

use iati_pipeline_domain::error::{PipelineError, PipelineResult};

use crate::infrastructure::config::DatabaseConfig;

/// The schema version this binary expects, reconciled against the `version`
/// table by `check_schema_version`. Bump alongside new migrations.
pub const CURRENT_SCHEMA_VERSION: &str = "1.0.0";

pub async fn connect(config: &DatabaseConfig) -> PipelineResult<PgPool> {
    let opts: PgConnectOptions = config
        .url
        .parse()
        .map_err(|e| PipelineError::InvalidConfiguration(format!("invalid DATABASE_URL: {e}")))?;

    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(config.retry_sleep_start)
        .with_max_interval(config.retry_sleep_max)
        .with_max_elapsed_time(Some(config.retry_sleep_max * config.retry_limit))
        .build();

    let pool = retry(backoff, || async {
        PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(config.connect_timeout)
            .connect_with(opts.clone())
            .await
            .map_err(|e| {
                warn!("database connection attempt failed: {e}");
                backoff::Error::transient(e)
            })
    })
    .await
    .map_err(|e| PipelineError::Database(format!("failed to acquire database pool: {e}")))?;

    debug!("connected to database, running migrations");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| PipelineError::Database(format!("migration failed: {e}")))?;

    info!("database schema is up to date");
    Ok(pool)
}

/// Aborts the pass with [`PipelineError::HardStop`] when the `version`
/// table's schema number does not match [`CURRENT_SCHEMA_VERSION`].
pub async fn check_schema_version(pool: &PgPool) -> PipelineResult<()> {
    let row: Option<(String,)> = sqlx::query_as("SELECT number FROM version LIMIT 1")
        .fetch_optional(pool)
        .await
        .map_err(|e| PipelineError::Database(e.to_string()))?;

    match row {
        Some((number,)) if number == CURRENT_SCHEMA_VERSION => Ok(()),
        Some((number,)) => Err(PipelineError::HardStop(format!(
            "schema version mismatch: database is at {number}, binary expects {CURRENT_SCHEMA_VERSION}"
        ))),
        None => Err(PipelineError::HardStop("version table is empty".to_string())),
    }
}
