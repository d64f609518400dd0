// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Flatten use case (`spec.md` §4.8): thin orchestration around
//! [`FlattenService`] — claim, download the cleaned blob, transform,
//! persist the resulting array, or fail the stage.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use iati_pipeline_domain::entities::{Document, Stage};
use iati_pipeline_domain::error::PipelineResult;
use iati_pipeline_domain::repositories::{Container, ObjectStoreRepository, StateStoreRepository};
use iati_pipeline_domain::services::FlattenService;

pub struct FlattenUseCase {
    state_store: Arc<dyn StateStoreRepository>,
    object_store: Arc<dyn ObjectStoreRepository>,
    flatten_service: Arc<dyn FlattenService>,
}

impl FlattenUseCase {
    pub fn new(state_store: Arc<dyn StateStoreRepository>, object_store: Arc<dyn ObjectStoreRepository>, flatten_service: Arc<dyn FlattenService>) -> Self {
        Self { state_store, object_store, flatten_service }
    }

    pub async fn candidates(&self) -> PipelineResult<Vec<Document>> {
        self.state_store.get_unflattened().await
    }

    pub async fn process(&self, document: &Document) {
        if let Err(e) = self.state_store.claim_flatten(&document.id, Utc::now()).await {
            warn!(document = %document.id, error = %e, "failed to claim flatten");
            return;
        }

        let blob_name = document.hash.blob_name();
        let bytes = match self.object_store.download_blob(Container::Clean, &blob_name).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                warn!(document = %document.id, "clean blob missing, rewinding to Clean");
                if let Err(e) = self.state_store.rewind_document(&document.id, Stage::Clean).await {
                    warn!(document = %document.id, error = %e, "failed to rewind document to Clean");
                }
                return;
            }
            Err(e) => {
                warn!(document = %document.id, error = %e, "failed to download clean blob");
                return;
            }
        };

        match self.flatten_service.flatten(&bytes) {
            Ok(activities) => {
                let value = match serde_json::to_value(&activities) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(document = %document.id, error = %e, "failed to serialise flattened activities");
                        let _ = self.state_store.fail_flatten(&document.id, e.to_string()).await;
                        return;
                    }
                };
                if let Err(e) = self.state_store.complete_flatten(&document.id, Utc::now(), value).await {
                    warn!(document = %document.id, error = %e, "failed to record flatten completion");
                } else {
                    info!(document = %document.id, "flattened");
                }
            }
            Err(e) => {
                warn!(document = %document.id, error = %e, "flatten failed");
                let _ = self.state_store.fail_flatten(&document.id, e.to_string()).await;
            }
        }
    }
}
