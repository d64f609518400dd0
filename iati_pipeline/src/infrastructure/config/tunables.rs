// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The per-stage tunables from `spec.md` §6 "Environment"
//! (`PARALLEL_PROCESSES`, `SAFETY_CHECK_*`, `*_SAFETY_PERCENTAGE`,
//! `RETRY_ERRORS_AFTER_LOOP`, `MAX_BATCH_LENGTH`). Loaded through the
//! `config` crate's `Environment` source so defaults layer under whatever
//! the process environment overrides, rather than hand-parsing each
//! variable individually. `PARALLEL_PROCESSES` is configured per stage, so
//! each struct reads its own prefixed variable
//! (`REFRESH_PARALLEL_PROCESSES`, `VALIDATE_PARALLEL_PROCESSES`,
//! `SOLRIZE_PARALLEL_PROCESSES`).

use serde::Deserialize;

use iati_pipeline_domain::error::{PipelineError, PipelineResult};

fn layered(defaults: &[(&str, &str)]) -> PipelineResult<config::Config> {
    let mut builder = config::Config::builder();
    for (key, value) in defaults {
        builder = builder
            .set_default(*key, *value)
            .map_err(|e| PipelineError::InvalidConfiguration(e.to_string()))?;
    }
    builder
        .add_source(config::Environment::default())
        .build()
        .map_err(|e| PipelineError::InvalidConfiguration(e.to_string()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshTunables {
    pub refresh_parallel_processes: u32,
    pub retry_errors_after_loop: u32,
    pub publisher_safety_percentage: f64,
    pub document_safety_percentage: f64,
}

impl RefreshTunables {
    pub fn from_env() -> PipelineResult<Self> {
        layered(&[
            ("refresh_parallel_processes", "4"),
            ("retry_errors_after_loop", "10"),
            ("publisher_safety_percentage", "50.0"),
            ("document_safety_percentage", "50.0"),
        ])?
        .try_deserialize()
        .map_err(|e| PipelineError::InvalidConfiguration(e.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateTunables {
    pub validate_parallel_processes: u32,
    pub safety_check_period_hours: u32,
    pub safety_check_threshold: u32,
}

impl ValidateTunables {
    pub fn from_env() -> PipelineResult<Self> {
        layered(&[
            ("validate_parallel_processes", "4"),
            ("safety_check_period_hours", "2"),
            ("safety_check_threshold", "5"),
        ])?
        .try_deserialize()
        .map_err(|e| PipelineError::InvalidConfiguration(e.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolrizeTunables {
    pub solrize_parallel_processes: u32,
    pub max_batch_length: u32,
}

impl SolrizeTunables {
    pub fn from_env() -> PipelineResult<Self> {
        layered(&[("solrize_parallel_processes", "4"), ("max_batch_length", "500")])?
            .try_deserialize()
            .map_err(|e| PipelineError::InvalidConfiguration(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_tunables_fall_back_to_defaults() {
        let t = RefreshTunables::from_env().unwrap();
        assert!(t.refresh_parallel_processes >= 1);
    }

    #[test]
    fn validate_and_solrize_tunables_use_independent_parallelism_keys() {
        let v = ValidateTunables::from_env().unwrap();
        let s = SolrizeTunables::from_env().unwrap();
        assert_eq!(v.validate_parallel_processes, 4);
        assert_eq!(s.solrize_parallel_processes, 4);
    }
}
