// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Validate (`spec.md` §4.5): schema then full validation, gated by the
//! black-flag/recency skip and recovering to a re-download when the
//! source blob has gone missing.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use iati_pipeline_domain::entities::{Document, Stage, ValidationReport};
use iati_pipeline_domain::error::PipelineResult;
use iati_pipeline_domain::repositories::{Container, ObjectStoreRepository, StateStoreRepository, ValidationOutcome, ValidationServiceClient};

use crate::infrastructure::config::ValidateTunables;

pub struct ValidateUseCase {
    state_store: Arc<dyn StateStoreRepository>,
    validation_service: Arc<dyn ValidationServiceClient>,
    object_store: Arc<dyn ObjectStoreRepository>,
    tunables: ValidateTunables,
}

impl ValidateUseCase {
    pub fn new(state_store: Arc<dyn StateStoreRepository>, validation_service: Arc<dyn ValidationServiceClient>, object_store: Arc<dyn ObjectStoreRepository>, tunables: ValidateTunables) -> Self {
        Self { state_store, validation_service, object_store, tunables }
    }

    pub async fn candidates(&self) -> PipelineResult<Vec<Document>> {
        self.state_store.get_unvalidated().await
    }

    pub async fn process(&self, document: &Document) {
        if self.should_skip(document).await {
            info!(document = %document.id, "skipping validate: schema invalid within safety window or publisher black-flagged");
            return;
        }

        let blob_name = document.hash.blob_name();

        if let Err(e) = self.state_store.claim_validation(&document.id, Utc::now()).await {
            warn!(document = %document.id, error = %e, "failed to claim validation");
            return;
        }

        let xml = match self.object_store.download_blob(Container::Source, &blob_name).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                warn!(document = %document.id, "source blob missing, rewinding to Download");
                if let Err(e) = self.state_store.rewind_document(&document.id, Stage::Download).await {
                    warn!(document = %document.id, error = %e, "failed to rewind document to Download");
                }
                return;
            }
            Err(e) => {
                warn!(document = %document.id, error = %e, "failed to download source blob");
                return;
            }
        };

        if document.file_schema_valid.is_none() {
            match self.validation_service.check_schema(&xml).await {
                Ok(ValidationOutcome::Completed { valid: Some(valid), .. }) => {
                    if let Err(e) = self.state_store.set_file_schema_valid(&document.id, valid).await {
                        warn!(document = %document.id, error = %e, "failed to record schema validity");
                    }
                    if !valid {
                        return;
                    }
                }
                Ok(ValidationOutcome::Completed { valid: None, .. }) => {
                    warn!(document = %document.id, "schema validator returned no definitive verdict, retrying next pass");
                    return;
                }
                Ok(ValidationOutcome::ClientError { status }) => {
                    if let Err(e) = self.state_store.set_validation_api_error(&document.id, status as i32).await {
                        warn!(document = %document.id, error = %e, "failed to record schema validation client error");
                    }
                    return;
                }
                Err(e) => {
                    warn!(document = %document.id, error = %e, "schema validation call failed, retrying next pass");
                    return;
                }
            }
        }

        match self.validation_service.validate(&xml).await {
            Ok(ValidationOutcome::Completed { valid: None, .. }) => {
                warn!(document = %document.id, "full validator returned no definitive verdict, retrying next pass");
            }
            Ok(ValidationOutcome::Completed { valid: Some(valid), report }) => {
                let validation_report = ValidationReport::new(
                    document.id.clone(),
                    document.hash.clone(),
                    document.url.clone(),
                    document.publisher.clone(),
                    document.name.clone(),
                    valid,
                    report,
                    Utc::now(),
                );
                match self.state_store.update_validation_state(&validation_report).await {
                    Ok(_) => info!(document = %document.id, valid, "validated"),
                    Err(e) => warn!(document = %document.id, error = %e, "failed to persist validation report"),
                }
            }
            Ok(ValidationOutcome::ClientError { status }) if is_expected_client_status(status) => {
                if let Err(e) = self.state_store.set_validation_api_error(&document.id, status as i32).await {
                    warn!(document = %document.id, error = %e, "failed to record expected validation client error");
                }
            }
            Ok(ValidationOutcome::ClientError { status }) => {
                warn!(document = %document.id, status, "unexpected validation client error, skipping this pass");
            }
            Err(e) => warn!(document = %document.id, error = %e, "full validation call failed, retrying next pass"),
        }
    }

    /// `spec.md` §4.5's skip gate: schema-invalid documents get a grace
    /// period before being reprocessed, and a black-flagged publisher's
    /// documents are skipped permanently for the current hash.
    async fn should_skip(&self, document: &Document) -> bool {
        if document.file_schema_valid != Some(false) {
            return false;
        }
        let Some(downloaded) = document.downloaded else { return false };
        let within_safety_window = Utc::now() - downloaded < chrono::Duration::hours(self.tunables.safety_check_period_hours as i64);
        if within_safety_window {
            return true;
        }
        match self.state_store.get_publisher(&document.publisher).await {
            Ok(Some(publisher)) => publisher.is_black_flagged(),
            _ => false,
        }
    }
}

fn is_expected_client_status(status: u16) -> bool {
    matches!(status, 400 | 413 | 422)
}
