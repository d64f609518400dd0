// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Environment-sourced configuration (`spec.md` §6 "Environment").
//!
//! One `Config` value is assembled at process start and passed by `Arc`
//! into every service/repository constructor; nothing here is read again
//! after startup and there is no global mutable state, matching the
//! teacher's configuration-as-value approach.

mod tunables;

pub use tunables::{RefreshTunables, SolrizeTunables, ValidateTunables};

use std::time::Duration;

use iati_pipeline_domain::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    pub connect_timeout: Duration,
    pub retry_limit: u32,
    pub retry_sleep_start: Duration,
    pub retry_sleep_max: Duration,
}

#[derive(Debug, Clone)]
pub struct BulkDataServiceConfig {
    pub dataset_index_url: String,
    pub reporting_org_index_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ValidationServiceConfig {
    pub schema_validation_url: String,
    pub full_validation_url: String,
    pub api_key_header_name: String,
    pub api_key_header_value: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub connection_string: String,
    pub source_container: String,
    pub clean_container: String,
    pub lake_container: String,
    pub max_blob_delete: usize,
}

#[derive(Debug, Clone)]
pub struct SearchIndexConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
    pub solr_500_sleep: Duration,
}

/// The process-wide configuration, assembled once in `main` and shared by
/// `Arc` across every use case and adapter.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub bulk_data_service: BulkDataServiceConfig,
    pub validation_service: ValidationServiceConfig,
    pub object_store: ObjectStoreConfig,
    pub search_index: SearchIndexConfig,
    pub refresh: RefreshTunables,
    pub validate: ValidateTunables,
    pub solrize: SolrizeTunables,
    pub explode_elements: Vec<String>,
    pub service_loop_sleep: Duration,
}

fn require_env(key: &str) -> PipelineResult<String> {
    std::env::var(key).map_err(|_| PipelineError::InvalidConfiguration(format!("missing required environment variable {key}")))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> PipelineResult<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| PipelineError::InvalidConfiguration(format!("{key} is not a valid value: {raw:?}"))),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Reads every variable family listed in `spec.md` §6 "Environment"
    /// from the process environment. Each variable is read exactly once;
    /// no caller should call this more than once per process.
    pub fn from_env() -> PipelineResult<Self> {
        let database = DatabaseConfig {
            url: require_env("DATABASE_URL")?,
            pool_size: env_parse_or("DB_POOL_SIZE", 10)?,
            connect_timeout: Duration::from_secs(env_parse_or("DB_CONNECT_TIMEOUT_SECS", 30)?),
            retry_limit: env_parse_or("DB_RETRY_LIMIT", 5)?,
            retry_sleep_start: Duration::from_millis(env_parse_or("DB_SLEEP_START_MS", 500)?),
            retry_sleep_max: Duration::from_secs(env_parse_or("DB_SLEEP_MAX_SECS", 30)?),
        };

        let bulk_data_service = BulkDataServiceConfig {
            dataset_index_url: require_env("BDS_DATASET_INDEX_URL")?,
            reporting_org_index_url: require_env("BDS_REPORTING_ORG_INDEX_URL")?,
            timeout: Duration::from_secs(env_parse_or("BDS_TIMEOUT_SECS", 60)?),
        };

        let validation_service = ValidationServiceConfig {
            schema_validation_url: require_env("SCHEMA_VALIDATION_URL")?,
            full_validation_url: require_env("FULL_VALIDATION_URL")?,
            api_key_header_name: env_or("VALIDATION_API_KEY_HEADER_NAME", "X-Api-Key"),
            api_key_header_value: env_or("VALIDATION_API_KEY_HEADER_VALUE", ""),
            timeout: Duration::from_secs(env_parse_or("VALIDATION_TIMEOUT_SECS", 120)?),
        };

        let object_store = ObjectStoreConfig {
            connection_string: require_env("OBJECT_STORE_CONNECTION_STRING")?,
            source_container: env_or("SOURCE_CONTAINER", "source"),
            clean_container: env_or("CLEAN_CONTAINER", "clean"),
            lake_container: env_or("LAKE_CONTAINER", "lake"),
            max_blob_delete: env_parse_or("MAX_BLOB_DELETE", 256)?,
        };

        let search_index = SearchIndexConfig {
            url: require_env("SEARCH_INDEX_URL")?,
            username: env_or("SEARCH_INDEX_USER", ""),
            password: env_or("SEARCH_INDEX_PASSWORD", ""),
            timeout: Duration::from_secs(env_parse_or("SEARCH_INDEX_TIMEOUT_SECS", 30)?),
            solr_500_sleep: Duration::from_secs(env_parse_or("SOLR_500_SLEEP", 5)?),
        };

        let explode_elements = env_or("EXPLODE_ELEMENTS", "transaction,budget")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            refresh: RefreshTunables::from_env()?,
            validate: ValidateTunables::from_env()?,
            solrize: SolrizeTunables::from_env()?,
            service_loop_sleep: Duration::from_secs(env_parse_or("SERVICE_LOOP_SLEEP", 300)?),
            database,
            bulk_data_service,
            validation_service,
            object_store,
            search_index,
            explode_elements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_var_is_invalid_configuration() {
        let err = require_env("IATI_PIPELINE_TEST_VAR_THAT_DOES_NOT_EXIST").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration(_)));
    }

    #[test]
    fn parse_falls_back_to_default_when_unset() {
        let value: u32 = env_parse_or("IATI_PIPELINE_TEST_VAR_THAT_DOES_NOT_EXIST_EITHER", 42).unwrap();
        assert_eq!(value, 42);
    }
}
