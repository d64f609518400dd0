// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Lakify use case (`spec.md` §4.9): downloads the cleaned blob, explodes
//! it into per-activity blob pairs via [`LakifyService`], and uploads each
//! pair into the `lake` container tagged with the document's hash.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use iati_pipeline_domain::entities::{Document, Stage};
use iati_pipeline_domain::error::PipelineResult;
use iati_pipeline_domain::repositories::{Container, ObjectStoreRepository, StateStoreRepository};
use iati_pipeline_domain::services::LakifyService;

pub struct LakifyUseCase {
    state_store: Arc<dyn StateStoreRepository>,
    object_store: Arc<dyn ObjectStoreRepository>,
    lakify_service: Arc<dyn LakifyService>,
}

impl LakifyUseCase {
    pub fn new(state_store: Arc<dyn StateStoreRepository>, object_store: Arc<dyn ObjectStoreRepository>, lakify_service: Arc<dyn LakifyService>) -> Self {
        Self { state_store, object_store, lakify_service }
    }

    pub async fn candidates(&self) -> PipelineResult<Vec<Document>> {
        self.state_store.get_unlakified().await
    }

    pub async fn process(&self, document: &Document) {
        if let Err(e) = self.state_store.claim_lakify(&document.id, Utc::now()).await {
            warn!(document = %document.id, error = %e, "failed to claim lakify");
            return;
        }

        let blob_name = document.hash.blob_name();
        let bytes = match self.object_store.download_blob(Container::Clean, &blob_name).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                warn!(document = %document.id, "clean blob missing, sending back to Clean");
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

        let activities = match self.lakify_service.explode(&bytes) {
            Ok(activities) => activities,
            Err(e) => {
                warn!(document = %document.id, error = %e, "lakify parse failed, sending back to Clean");
                if let Err(e) = self.state_store.rewind_document(&document.id, Stage::Clean).await {
                    warn!(document = %document.id, error = %e, "failed to rewind document to Clean");
                }
                return;
            }
        };

        for activity in &activities {
            let xml_name = format!("{}/{}.xml", document.id.as_str(), activity.id_hash);
            let json_name = format!("{}/{}.json", document.id.as_str(), activity.id_hash);

            if let Err(e) = self.object_store.upload_blob(Container::Lake, &xml_name, activity.xml.clone().into()).await {
                warn!(document = %document.id, error = %e, "failed to upload lake xml blob");
                let _ = self.state_store.fail_lakify(&document.id, e.to_string()).await;
                return;
            }
            let json_bytes = match serde_json::to_vec(&activity.json) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(document = %document.id, error = %e, "failed to serialise lake json blob");
                    let _ = self.state_store.fail_lakify(&document.id, e.to_string()).await;
                    return;
                }
            };
            if let Err(e) = self.object_store.upload_blob(Container::Lake, &json_name, json_bytes.into()).await {
                warn!(document = %document.id, error = %e, "failed to upload lake json blob");
                let _ = self.state_store.fail_lakify(&document.id, e.to_string()).await;
                return;
            }
            for name in [&xml_name, &json_name] {
                if let Err(e) = self.object_store.set_blob_tags(Container::Lake, name, &[("dataset_hash", document.hash.as_str()), ("document_id", document.id.as_str())]).await {
                    warn!(document = %document.id, error = %e, "failed to tag lake blob");
                }
            }
        }

        if let Err(e) = self.state_store.complete_lakify(&document.id, Utc::now()).await {
            warn!(document = %document.id, error = %e, "failed to record lakify completion");
        } else {
            info!(document = %document.id, activities = activities.len(), "lakified");
        }
    }
}
