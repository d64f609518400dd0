// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Prometheus gauges for queue depth and per-stage progress, registered
//! once and updated by the orchestrator between passes.

use std::sync::Arc;

use prometheus::{Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use iati_pipeline_domain::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Download,
    Validate,
    Clean,
    Flatten,
    Lakify,
    Solrize,
}

impl Stage {
    fn label(self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Validate => "validate",
            Stage::Clean => "clean",
            Stage::Flatten => "flatten",
            Stage::Lakify => "lakify",
            Stage::Solrize => "solrize",
        }
    }
}

/// Registers and serves the gauges named in `spec.md` §7: one queue-depth
/// gauge per stage (`datasets_to_download`, `datasets_to_validate`, …) plus
/// `in_progress`/`error` gauges keyed by stage label.
#[derive(Clone)]
pub struct MetricsService {
    registry: Arc<Registry>,
    datasets_to_download: IntGauge,
    datasets_to_validate: IntGauge,
    datasets_to_clean: IntGauge,
    datasets_to_flatten: IntGauge,
    datasets_to_lakify: IntGauge,
    datasets_to_solrize: IntGauge,
    stage_in_progress: IntGaugeVec,
    stage_errors: IntGaugeVec,
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, PipelineError> {
    let gauge = IntGauge::with_opts(Opts::new(name, help).namespace("iati_pipeline"))
        .map_err(|e| PipelineError::InternalError(format!("failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(|e| PipelineError::InternalError(format!("failed to register {name} metric: {e}")))?;
    Ok(gauge)
}

impl MetricsService {
    pub fn new() -> Result<Self, PipelineError> {
        let registry = Registry::new();

        let datasets_to_download = gauge(&registry, "datasets_to_download", "Documents awaiting Download")?;
        let datasets_to_validate = gauge(&registry, "datasets_to_validate", "Documents awaiting Validate")?;
        let datasets_to_clean = gauge(&registry, "datasets_to_clean", "Documents awaiting Clean")?;
        let datasets_to_flatten = gauge(&registry, "datasets_to_flatten", "Documents awaiting Flatten")?;
        let datasets_to_lakify = gauge(&registry, "datasets_to_lakify", "Documents awaiting Lakify")?;
        let datasets_to_solrize = gauge(&registry, "datasets_to_solrize", "Documents awaiting Solrize")?;

        let stage_in_progress = IntGaugeVec::new(
            Opts::new("stage_in_progress", "Documents currently claimed by a stage").namespace("iati_pipeline"),
            &["stage"],
        )
        .map_err(|e| PipelineError::InternalError(format!("failed to create stage_in_progress metric: {e}")))?;
        registry
            .register(Box::new(stage_in_progress.clone()))
            .map_err(|e| PipelineError::InternalError(format!("failed to register stage_in_progress metric: {e}")))?;

        let stage_errors = IntGaugeVec::new(
            Opts::new("stage_errors", "Documents with an unresolved error in a stage").namespace("iati_pipeline"),
            &["stage"],
        )
        .map_err(|e| PipelineError::InternalError(format!("failed to create stage_errors metric: {e}")))?;
        registry
            .register(Box::new(stage_errors.clone()))
            .map_err(|e| PipelineError::InternalError(format!("failed to register stage_errors metric: {e}")))?;

        Ok(Self {
            registry: Arc::new(registry),
            datasets_to_download,
            datasets_to_validate,
            datasets_to_clean,
            datasets_to_flatten,
            datasets_to_lakify,
            datasets_to_solrize,
            stage_in_progress,
            stage_errors,
        })
    }

    pub fn set_queue_depth(&self, stage: Stage, depth: i64) {
        match stage {
            Stage::Download => self.datasets_to_download.set(depth),
            Stage::Validate => self.datasets_to_validate.set(depth),
            Stage::Clean => self.datasets_to_clean.set(depth),
            Stage::Flatten => self.datasets_to_flatten.set(depth),
            Stage::Lakify => self.datasets_to_lakify.set(depth),
            Stage::Solrize => self.datasets_to_solrize.set(depth),
        }
    }

    pub fn set_in_progress(&self, stage: Stage, count: i64) {
        self.stage_in_progress.with_label_values(&[stage.label()]).set(count);
    }

    pub fn set_errors(&self, stage: Stage, count: i64) {
        self.stage_errors.with_label_values(&[stage.label()]).set(count);
    }

    pub fn gather_text(&self) -> Result<String, PipelineError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| PipelineError::InternalError(format!("failed to encode metrics: {e}")))?;
        String::from_utf8(buffer).map_err(|e| PipelineError::InternalError(format!("metrics output not utf-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_depth_gauges_round_trip() {
        let metrics = MetricsService::new().unwrap();
        metrics.set_queue_depth(Stage::Download, 7);
        metrics.set_in_progress(Stage::Clean, 2);
        metrics.set_errors(Stage::Validate, 1);

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("iati_pipeline_datasets_to_download 7"));
        assert!(text.contains("stage_in_progress"));
        assert!(text.contains("stage_errors"));
    }
}
