// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Refresh (`spec.md` §4.3): reconciles publisher and document rows with
//! the Bulk Data Service indices, runs the publisher/document safety
//! checks, and triggers the cross-store cleanup protocol for stale or
//! changed documents.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use iati_pipeline_domain::entities::Publisher;
use iati_pipeline_domain::error::{PipelineError, PipelineResult};
use iati_pipeline_domain::repositories::{
    BulkDataServiceClient, Container, DatasetObservation, IndexFetch, ObjectStoreRepository, SearchIndexRepository,
    StateStoreRepository, UpsertOutcome,
};
use iati_pipeline_domain::value_objects::{ContentHash, DocumentId, PublisherId};

use crate::infrastructure::config::RefreshTunables;

pub struct RefreshUseCase {
    state_store: Arc<dyn StateStoreRepository>,
    bulk_data_service: Arc<dyn BulkDataServiceClient>,
    object_store: Arc<dyn ObjectStoreRepository>,
    search_index: Arc<dyn SearchIndexRepository>,
    tunables: RefreshTunables,
    max_blob_delete: usize,
}

#[derive(Debug, Default)]
pub struct RefreshOutcome {
    pub publishers_seen: usize,
    pub documents_seen: usize,
    pub documents_changed: usize,
    pub documents_removed: u64,
    pub publishers_removed: u64,
}

impl RefreshUseCase {
    pub fn new(
        state_store: Arc<dyn StateStoreRepository>,
        bulk_data_service: Arc<dyn BulkDataServiceClient>,
        object_store: Arc<dyn ObjectStoreRepository>,
        search_index: Arc<dyn SearchIndexRepository>,
        tunables: RefreshTunables,
        max_blob_delete: usize,
    ) -> Self {
        Self { state_store, bulk_data_service, object_store, search_index, tunables, max_blob_delete }
    }

    /// Runs one Refresh pass (`spec.md` §4.3, steps 1-8). Returns once the
    /// reconciliation and cleanup are both complete; the caller's
    /// orchestrator decides whether and when to run another pass.
    pub async fn run(&self, if_none_match_datasets: Option<&str>, if_none_match_orgs: Option<&str>) -> PipelineResult<RefreshOutcome> {
        let pass_start = Utc::now();

        let (orgs, orgs_created_at) = match self.bulk_data_service.fetch_reporting_orgs(if_none_match_orgs).await? {
            IndexFetch::NotModified => {
                info!("reporting-org index unchanged, skipping pass");
                return Ok(RefreshOutcome::default());
            }
            IndexFetch::Fresh { entries, index_created_unix_timestamp, .. } => (entries, index_created_unix_timestamp),
        };
        let (datasets, datasets_created_at) = match self.bulk_data_service.fetch_datasets(if_none_match_datasets).await? {
            IndexFetch::NotModified => {
                info!("dataset index unchanged, skipping pass");
                return Ok(RefreshOutcome::default());
            }
            IndexFetch::Fresh { entries, index_created_unix_timestamp, .. } => (entries, index_created_unix_timestamp),
        };

        if orgs_created_at != datasets_created_at {
            return Err(PipelineError::HardStop(format!(
                "dataset index and reporting-org index are from different BDS runs: {datasets_created_at} vs {orgs_created_at}"
            )));
        }

        let mut dataset_counts: HashMap<PublisherId, i64> = HashMap::new();
        for dataset in &datasets {
            *dataset_counts.entry(dataset.publisher.clone()).or_insert(0) += 1;
        }

        let current_publisher_count = self.state_store.get_num_publishers().await?;
        if !self.passes_safety_check(orgs.len() as i64, current_publisher_count, self.tunables.publisher_safety_percentage) {
            return Err(PipelineError::HardStop(format!(
                "refresh safety check failed: {} reporting orgs vs {} known publishers",
                orgs.len(),
                current_publisher_count
            )));
        }
        let current_document_count = self.state_store.get_num_documents().await?;
        if !self.passes_safety_check(datasets.len() as i64, current_document_count, self.tunables.document_safety_percentage) {
            return Err(PipelineError::HardStop(format!(
                "refresh safety check failed: {} datasets vs {} known documents",
                datasets.len(),
                current_document_count
            )));
        }

        for org in &orgs {
            let dataset_count = dataset_counts.get(&org.org_id).copied().unwrap_or(0);
            let publisher = match self.state_store.get_publisher(&org.org_id).await? {
                Some(mut existing) => {
                    existing.observe(org.title.clone(), org.iati_identifier.clone(), dataset_count, pass_start);
                    existing
                }
                None => {
                    let mut fresh = Publisher::new_observed(org.org_id.clone(), org.short_name.clone(), org.title.clone(), org.iati_identifier.clone(), pass_start);
                    fresh.dataset_count = dataset_count;
                    fresh
                }
            };
            self.state_store.upsert_publisher_seen(&publisher).await?;
        }

        let disappeared_publishers = self.state_store.get_publishers_not_seen_after(pass_start).await?;
        if !disappeared_publishers.is_empty() {
            let orphaned_documents = self.state_store.get_files_from_publishers_not_seen_after(pass_start).await?;
            self.cleanup_stale_documents(orphaned_documents.into_iter()).await;
        }
        let publishers_removed = self.state_store.remove_publishers_not_seen_after(pass_start).await?;

        let mut documents_changed = 0usize;
        for dataset in &datasets {
            let observation = DatasetObservation {
                id: DocumentId::new(dataset.id.clone()),
                hash: ContentHash::new(dataset.hash.clone()),
                url: dataset.url.clone(),
                bds_cache_url: dataset.cache_url.clone(),
                publisher: dataset.publisher.clone(),
                name: dataset.name.clone(),
            };
            match self.state_store.insert_or_update_document(&observation, pass_start).await {
                Ok(UpsertOutcome::HashChanged { old_hash }) => {
                    documents_changed += 1;
                    self.cleanup_changed_document(&observation.id, &old_hash).await;
                }
                Ok(_) => {}
                Err(e) => warn!(document = %dataset.id, error = %e, "failed to upsert document during refresh"),
            }
        }

        let stale = self.state_store.get_files_not_seen_after(pass_start).await?;
        let stale_count = stale.len();
        self.cleanup_stale_documents(stale.into_iter()).await;
        let documents_removed = self.state_store.remove_files_not_seen_after(pass_start).await?;

        Ok(RefreshOutcome {
            publishers_seen: orgs.len(),
            documents_seen: datasets.len(),
            documents_changed,
            documents_removed,
            publishers_removed,
        })
        .inspect(|outcome| info!(?outcome, stale_count, "refresh pass complete"))
    }

    fn passes_safety_check(&self, observed: i64, current: i64, safety_percentage: f64) -> bool {
        if current == 0 {
            return true;
        }
        let threshold = (safety_percentage / 100.0) * current as f64;
        observed as f64 >= threshold
    }

    /// Cross-Store Cleanup Protocol, stale branch (`spec.md` §4.11): OS
    /// cleanup for source/clean/lake plus a full SI delete, since a stale
    /// document will never be reprocessed to naturally overwrite the index.
    async fn cleanup_stale_documents(&self, documents: impl Iterator<Item = (DocumentId, ContentHash)>) {
        for (id, hash) in documents {
            if let Err(e) = self.cleanup_object_store(&id, &hash).await {
                warn!(document = %id, error = %e, "object store cleanup failed for stale document");
            }
            if let Err(e) = self.search_index.delete_document(&id).await {
                warn!(document = %id, error = %e, "search index cleanup failed for stale document");
            }
        }
    }

    /// Cross-Store Cleanup Protocol, changed branch: same object-store
    /// cleanup as stale, but the search index is left untouched — Solrize's
    /// delete-before-insert on the next pass is what keeps it consistent.
    async fn cleanup_changed_document(&self, id: &DocumentId, old_hash: &ContentHash) {
        if let Err(e) = self.cleanup_object_store(id, old_hash).await {
            warn!(document = %id, error = %e, "object store cleanup failed for changed document");
        }
    }

    async fn cleanup_object_store(&self, id: &DocumentId, hash: &ContentHash) -> PipelineResult<()> {
        let lake_blobs = self.object_store.find_blobs_by_tags(Container::Lake, "dataset_hash", hash.as_str()).await?;
        for chunk in lake_blobs.chunks(self.max_blob_delete) {
            self.object_store.delete_blobs(Container::Lake, chunk).await?;
        }

        if self.object_store.blob_exists(Container::Source, &hash.blob_name()).await? {
            self.object_store.delete_blob(Container::Source, &hash.blob_name()).await?;
        } else {
            let fallback = self.object_store.find_blobs_by_tags(Container::Source, "document_id", id.as_str()).await?;
            self.object_store.delete_blobs(Container::Source, &fallback).await?;
        }

        if self.object_store.blob_exists(Container::Clean, &hash.blob_name()).await? {
            self.object_store.delete_blob(Container::Clean, &hash.blob_name()).await?;
        } else {
            let fallback = self.object_store.find_blobs_by_tags(Container::Clean, "document_id", id.as_str()).await?;
            self.object_store.delete_blobs(Container::Clean, &fallback).await?;
        }

        Ok(())
    }
}
