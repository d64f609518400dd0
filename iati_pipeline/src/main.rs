// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Composition root: reads configuration, wires every adapter behind its
//! domain trait, installs signal handling, and dispatches the parsed CLI
//! subcommand to its use case (`spec.md` §6 "CLI surface").

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};

use iati_pipeline::application::orchestrator::{run_loop, run_striped};
use iati_pipeline::application::use_cases::{CleanUseCase, DownloadUseCase, FlattenUseCase, LakifyUseCase, RefreshUseCase, SafetyControllerUseCase, SolrizeUseCase, ValidateUseCase};
use iati_pipeline::infrastructure::adapters::{AzureObjectStoreRepository, ReqwestBulkDataServiceClient, ReqwestValidationServiceClient, SolrSearchIndexRepository};
use iati_pipeline::infrastructure::config::Config;
use iati_pipeline::infrastructure::flatten::QuickXmlFlattenService;
use iati_pipeline::infrastructure::lakify::QuickXmlLakifyService;
use iati_pipeline::infrastructure::metrics::MetricsEndpoint;
use iati_pipeline::infrastructure::repositories::{schema, PostgresStateStoreRepository};
use iati_pipeline::infrastructure::{logging, metrics};
use iati_pipeline_bootstrap::{map_error_to_exit_code, parse_cli, Command, ShutdownCoordinator};
use iati_pipeline_domain::error::PipelineError;
use iati_pipeline_domain::repositories::{BulkDataServiceClient, ObjectStoreRepository, SearchIndexRepository, StateStoreRepository, ValidationServiceClient};
use iati_pipeline_domain::services::{FlattenService, LakifyService};
use iati_pipeline_domain::value_objects::ExplodeElement;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "pipeline exited with error");
            map_error_to_exit_code(&e)
        }
    }
}

async fn run() -> Result<(), PipelineError> {
    let cli = parse_cli();
    let config = Config::from_env()?;

    let pool = schema::connect(&config.database).await?;
    schema::check_schema_version(&pool).await?;

    let state_store: Arc<dyn StateStoreRepository> = Arc::new(PostgresStateStoreRepository::new(pool));
    let bulk_data_service: Arc<dyn BulkDataServiceClient> = Arc::new(ReqwestBulkDataServiceClient::new(config.bulk_data_service.clone())?);
    let validation_service: Arc<dyn ValidationServiceClient> = Arc::new(ReqwestValidationServiceClient::new(config.validation_service.clone())?);
    let object_store: Arc<dyn ObjectStoreRepository> = Arc::new(AzureObjectStoreRepository::new(&config.object_store)?);
    let search_index: Arc<dyn SearchIndexRepository> = Arc::new(SolrSearchIndexRepository::new(config.search_index.clone(), &config.explode_elements)?);

    let shutdown = ShutdownCoordinator::default();
    iati_pipeline_bootstrap::signals::install(shutdown.clone());

    let metrics_service = Arc::new(metrics::MetricsService::new().map_err(|e| PipelineError::InternalError(e.to_string()))?);
    let metrics_bind_addr = std::env::var("METRICS_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:9090".to_string());
    tokio::spawn({
        let endpoint = MetricsEndpoint::new(metrics_service, metrics_bind_addr);
        async move {
            if let Err(e) = endpoint.start().await {
                warn!(error = %e, "metrics endpoint stopped");
            }
        }
    });

    let refresh_use_case = Arc::new(RefreshUseCase::new(state_store.clone(), bulk_data_service.clone(), object_store.clone(), search_index.clone(), config.refresh.clone(), config.object_store.max_blob_delete));
    let download_use_case = Arc::new(DownloadUseCase::new(state_store.clone(), bulk_data_service.clone(), object_store.clone()));
    let validate_use_case = Arc::new(ValidateUseCase::new(state_store.clone(), validation_service.clone(), object_store.clone(), config.validate.clone()));
    let safety_controller = Arc::new(SafetyControllerUseCase::new(state_store.clone(), std::env::var("BLACK_FLAG_NOTIFICATION_URL").ok(), config.validate.clone()));
    let clean_use_case = Arc::new(CleanUseCase::new(state_store.clone(), object_store.clone()));
    let flatten_service: Arc<dyn FlattenService> = Arc::new(QuickXmlFlattenService::new(config.explode_elements.clone()));
    let flatten_use_case = Arc::new(FlattenUseCase::new(state_store.clone(), object_store.clone(), flatten_service));
    let lakify_service: Arc<dyn LakifyService> = Arc::new(QuickXmlLakifyService::new());
    let lakify_use_case = Arc::new(LakifyUseCase::new(state_store.clone(), object_store.clone(), lakify_service));
    let explode_elements: Vec<ExplodeElement> = config.explode_elements.iter().cloned().map(ExplodeElement::new).collect();
    let solrize_use_case = Arc::new(SolrizeUseCase::new(state_store.clone(), object_store.clone(), search_index.clone(), explode_elements, config.solrize.clone()));

    let refresh_parallel_processes = config.refresh.refresh_parallel_processes;
    let validate_parallel_processes = config.validate.validate_parallel_processes;
    let solrize_parallel_processes = config.solrize.solrize_parallel_processes;

    match cli.command {
        Command::Refresh => {
            refresh_use_case.run(None, None).await?;
        }
        Command::RefreshLoop => {
            // Every pass re-fetches both indices unconditionally: the
            // use case does not expose the ETag it read back out, so a
            // loop iteration has nothing to condition its next request
            // on. Worth revisiting if BDS index fetches become a cost
            // concern.
            run_loop(shutdown.token(), config.service_loop_sleep, || async {
                if let Err(e) = refresh_use_case.run(None, None).await {
                    error!(error = %e, "refresh pass failed");
                }
            })
            .await;
        }
        Command::Reload { retry_errors } => {
            refresh_use_case.run(None, None).await?;
            download_all(&download_use_case, retry_errors, refresh_parallel_processes).await;
        }
        Command::SafetyCheck => {
            let notified = safety_controller.run().await?;
            info!(notified, "safety check complete");
        }
        Command::Validate => {
            validate_all(&validate_use_case, validate_parallel_processes).await;
        }
        Command::ValidateLoop => {
            run_loop(shutdown.token(), config.service_loop_sleep, || async {
                validate_all(&validate_use_case, validate_parallel_processes).await;
            })
            .await;
        }
        Command::CopyValid => {
            copy_valid_all(&clean_use_case).await;
        }
        Command::CleanInvalid => {
            clean_invalid_all(&clean_use_case).await;
        }
        Command::CleanLoop => {
            run_loop(shutdown.token(), config.service_loop_sleep, || async {
                copy_valid_all(&clean_use_case).await;
                clean_invalid_all(&clean_use_case).await;
            })
            .await;
        }
        Command::Flatten => {
            flatten_all(&flatten_use_case).await;
        }
        Command::FlattenLoop => {
            run_loop(shutdown.token(), config.service_loop_sleep, || async {
                flatten_all(&flatten_use_case).await;
            })
            .await;
        }
        Command::Lakify => {
            lakify_all(&lakify_use_case).await;
        }
        Command::LakifyLoop => {
            run_loop(shutdown.token(), config.service_loop_sleep, || async {
                lakify_all(&lakify_use_case).await;
            })
            .await;
        }
        Command::Solrize => {
            solrize_all(&solrize_use_case, solrize_parallel_processes).await;
        }
        Command::SolrizeLoop => {
            run_loop(shutdown.token(), config.service_loop_sleep, || async {
                solrize_all(&solrize_use_case, solrize_parallel_processes).await;
            })
            .await;
        }
    }

    Ok(())
}

async fn download_all(use_case: &Arc<DownloadUseCase>, retry_errors: bool, parallel_processes: u32) {
    let candidates = match use_case.candidates(retry_errors).await {
        Ok(candidates) => candidates,
        Err(e) => {
            error!(error = %e, "failed to fetch download candidates");
            return;
        }
    };
    run_striped(candidates, parallel_processes, {
        let use_case = use_case.clone();
        move |candidate| {
            let use_case = use_case.clone();
            async move { use_case.process(&candidate).await }
        }
    })
    .await;
}

async fn validate_all(use_case: &Arc<ValidateUseCase>, parallel_processes: u32) {
    let candidates = match use_case.candidates().await {
        Ok(candidates) => candidates,
        Err(e) => {
            error!(error = %e, "failed to fetch validate candidates");
            return;
        }
    };
    run_striped(candidates, parallel_processes, {
        let use_case = use_case.clone();
        move |document| {
            let use_case = use_case.clone();
            async move { use_case.process(&document).await }
        }
    })
    .await;
}

async fn copy_valid_all(use_case: &Arc<CleanUseCase>) {
    let pairs = match use_case.valid_to_copy().await {
        Ok(pairs) => pairs,
        Err(e) => {
            error!(error = %e, "failed to fetch copy-valid candidates");
            return;
        }
    };
    for (document, _) in pairs {
        use_case.copy_valid(&document).await;
    }
}

async fn clean_invalid_all(use_case: &Arc<CleanUseCase>) {
    let pairs = match use_case.invalid_to_clean().await {
        Ok(pairs) => pairs,
        Err(e) => {
            error!(error = %e, "failed to fetch clean-invalid candidates");
            return;
        }
    };
    for (document, report) in pairs {
        use_case.clean_invalid(&document, &report).await;
    }
}

async fn flatten_all(use_case: &Arc<FlattenUseCase>) {
    let candidates = match use_case.candidates().await {
        Ok(candidates) => candidates,
        Err(e) => {
            error!(error = %e, "failed to fetch flatten candidates");
            return;
        }
    };
    for document in candidates {
        use_case.process(&document).await;
    }
}

async fn lakify_all(use_case: &Arc<LakifyUseCase>) {
    let candidates = match use_case.candidates().await {
        Ok(candidates) => candidates,
        Err(e) => {
            error!(error = %e, "failed to fetch lakify candidates");
            return;
        }
    };
    for document in candidates {
        use_case.process(&document).await;
    }
}

async fn solrize_all(use_case: &Arc<SolrizeUseCase>, parallel_processes: u32) {
    let candidates = match use_case.candidates().await {
        Ok(candidates) => candidates,
        Err(e) => {
            error!(error = %e, "failed to fetch solrize candidates");
            return;
        }
    };
    run_striped(candidates, parallel_processes, {
        let use_case = use_case.clone();
        move |document| {
            let use_case = use_case.clone();
            async move { use_case.process(&document).await }
        }
    })
    .await;
}
