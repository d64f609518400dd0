// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! End-to-end scenarios from `spec.md` §8, run against in-memory fakes for
//! the state store, object store, and search index so the Flatten → Lakify
//! → Solrize chain is exercised without a database or Solr instance.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use iati_pipeline::application::use_cases::{FlattenUseCase, LakifyUseCase, RefreshUseCase, SolrizeUseCase, ValidateUseCase};
use iati_pipeline::infrastructure::config::{RefreshTunables, SolrizeTunables, ValidateTunables};
use iati_pipeline::infrastructure::flatten::QuickXmlFlattenService;
use iati_pipeline::infrastructure::lakify::QuickXmlLakifyService;
use iati_pipeline_domain::entities::{Document, Publisher, Stage, ValidationReport};
use iati_pipeline_domain::error::{PipelineError, PipelineResult};
use iati_pipeline_domain::repositories::{
    BulkDataServiceClient, Container, DatasetEntry, DatasetObservation, IndexFetch, ObjectStoreRepository, RefreshCandidate, ReportingOrg,
    SearchIndexRepository, SolrRecord, StateStoreRepository, UpsertOutcome, ValidationOutcome, ValidationServiceClient, ACTIVITY_CORE,
};
use iati_pipeline_domain::services::{FlattenService, LakifyService};
use iati_pipeline_domain::value_objects::{ContentHash, DocumentId, PublisherId};

const ACTIVITY_XML: &[u8] = br#"<iati-activities version="2.03">
    <iati-activity default-currency="USD">
        <iati-identifier>  AA-1  </iati-identifier>
        <title><narrative>Example activity</narrative></title>
    </iati-activity>
</iati-activities>"#;

/// In-memory [`StateStoreRepository`], holding just what Flatten/Lakify/
/// Solrize read and write: the `Document` row keyed by id. Every method a
/// scenario below never calls is still implemented, with the simplest
/// behaviour that keeps the trait's invariants honest (e.g. publisher
/// queries return nothing, since these scenarios never register one).
#[derive(Default)]
struct FakeStateStore {
    documents: Mutex<HashMap<DocumentId, Document>>,
}

impl FakeStateStore {
    fn with_document(document: Document) -> Self {
        let mut documents = HashMap::new();
        documents.insert(document.id.clone(), document);
        Self { documents: Mutex::new(documents) }
    }

    fn get(&self, id: &DocumentId) -> Document {
        self.documents.lock().unwrap().get(id).cloned().expect("document must exist")
    }
}

#[async_trait]
impl StateStoreRepository for FakeStateStore {
    async fn get_schema_version(&self) -> PipelineResult<Option<(String, i64)>> {
        Ok(None)
    }
    async fn set_schema_version(&self, _number: &str, _migration: i64) -> PipelineResult<()> {
        Ok(())
    }

    async fn get_num_publishers(&self) -> PipelineResult<i64> {
        Ok(0)
    }
    async fn upsert_publisher_seen(&self, _publisher: &Publisher) -> PipelineResult<()> {
        Ok(())
    }
    async fn get_publisher(&self, _id: &PublisherId) -> PipelineResult<Option<Publisher>> {
        Ok(None)
    }
    async fn get_publishers_not_seen_after(&self, _pass_start: DateTime<Utc>) -> PipelineResult<Vec<PublisherId>> {
        Ok(Vec::new())
    }
    async fn remove_publishers_not_seen_after(&self, _pass_start: DateTime<Utc>) -> PipelineResult<u64> {
        Ok(0)
    }
    async fn get_black_flag_candidates(&self, _threshold: i64, _since: DateTime<Utc>) -> PipelineResult<Vec<PublisherId>> {
        Ok(Vec::new())
    }
    async fn set_black_flag(&self, _id: &PublisherId, _now: DateTime<Utc>) -> PipelineResult<()> {
        Ok(())
    }
    async fn clear_black_flag(&self, _id: &PublisherId) -> PipelineResult<()> {
        Ok(())
    }
    async fn get_publishers_needing_black_flag_notification(&self) -> PipelineResult<Vec<Publisher>> {
        Ok(Vec::new())
    }
    async fn mark_black_flag_notified(&self, _id: &PublisherId) -> PipelineResult<()> {
        Ok(())
    }

    async fn get_num_documents(&self) -> PipelineResult<i64> {
        Ok(self.documents.lock().unwrap().len() as i64)
    }
    async fn insert_or_update_document(&self, observation: &DatasetObservation, now: DateTime<Utc>) -> PipelineResult<UpsertOutcome> {
        let mut documents = self.documents.lock().unwrap();
        match documents.get_mut(&observation.id) {
            None => {
                let document = Document::new_observed(
                    observation.id.clone(),
                    observation.hash.clone(),
                    observation.url.clone(),
                    observation.bds_cache_url.clone(),
                    observation.publisher.clone(),
                    observation.name.clone(),
                    now,
                );
                documents.insert(observation.id.clone(), document);
                Ok(UpsertOutcome::Inserted)
            }
            Some(document) if document.hash == observation.hash => {
                document.url = observation.url.clone();
                document.name = observation.name.clone();
                document.bds_cache_url = observation.bds_cache_url.clone();
                document.last_seen = now;
                Ok(UpsertOutcome::Unchanged)
            }
            Some(document) => {
                let old_hash = document.hash.clone();
                document.apply_hash_change(observation.hash.clone(), observation.url.clone(), observation.name.clone(), observation.bds_cache_url.clone(), now);
                Ok(UpsertOutcome::HashChanged { old_hash })
            }
        }
    }
    async fn get_files_not_seen_after(&self, _pass_start: DateTime<Utc>) -> PipelineResult<Vec<(DocumentId, ContentHash)>> {
        Ok(Vec::new())
    }
    async fn remove_files_not_seen_after(&self, _pass_start: DateTime<Utc>) -> PipelineResult<u64> {
        Ok(0)
    }
    async fn get_files_from_publishers_not_seen_after(&self, _pass_start: DateTime<Utc>) -> PipelineResult<Vec<(DocumentId, ContentHash)>> {
        Ok(Vec::new())
    }
    async fn get_document(&self, id: &DocumentId) -> PipelineResult<Option<Document>> {
        Ok(self.documents.lock().unwrap().get(id).cloned())
    }
    async fn rewind_document(&self, id: &DocumentId, from_stage: Stage) -> PipelineResult<()> {
        if let Some(document) = self.documents.lock().unwrap().get_mut(id) {
            document.rewind_from(from_stage);
        }
        Ok(())
    }

    async fn get_refresh_candidates(&self, _retry_errors: bool) -> PipelineResult<Vec<RefreshCandidate>> {
        Ok(Vec::new())
    }
    async fn mark_downloaded(&self, _id: &DocumentId, _now: DateTime<Utc>) -> PipelineResult<()> {
        Ok(())
    }
    async fn mark_download_error(&self, _id: &DocumentId, _code: i32) -> PipelineResult<()> {
        Ok(())
    }

    async fn get_unvalidated(&self) -> PipelineResult<Vec<Document>> {
        Ok(Vec::new())
    }
    async fn claim_validation(&self, _id: &DocumentId, _now: DateTime<Utc>) -> PipelineResult<()> {
        Ok(())
    }
    async fn set_file_schema_valid(&self, _id: &DocumentId, _valid: bool) -> PipelineResult<()> {
        Ok(())
    }
    async fn set_validation_api_error(&self, _id: &DocumentId, _status: i32) -> PipelineResult<()> {
        Ok(())
    }
    async fn update_validation_state(&self, _report: &ValidationReport) -> PipelineResult<i64> {
        Ok(1)
    }
    async fn get_validation_report(&self, _id: i64) -> PipelineResult<Option<ValidationReport>> {
        Ok(None)
    }

    async fn get_valid_to_copy(&self) -> PipelineResult<Vec<(Document, ValidationReport)>> {
        Ok(Vec::new())
    }
    async fn get_invalid_to_clean(&self) -> PipelineResult<Vec<(Document, ValidationReport)>> {
        Ok(Vec::new())
    }
    async fn claim_clean(&self, _id: &DocumentId, _now: DateTime<Utc>) -> PipelineResult<()> {
        Ok(())
    }
    async fn complete_clean(&self, _id: &DocumentId, _now: DateTime<Utc>) -> PipelineResult<()> {
        Ok(())
    }
    async fn fail_clean(&self, _id: &DocumentId, _error: String) -> PipelineResult<()> {
        Ok(())
    }
    async fn reset_unfinished_clean(&self) -> PipelineResult<u64> {
        Ok(0)
    }

    async fn get_unflattened(&self) -> PipelineResult<Vec<Document>> {
        Ok(self.documents.lock().unwrap().values().filter(|d| d.is_unflattened()).cloned().collect())
    }
    async fn claim_flatten(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()> {
        self.documents.lock().unwrap().get_mut(id).unwrap().flatten.claim(now);
        Ok(())
    }
    async fn complete_flatten(&self, id: &DocumentId, now: DateTime<Utc>, activities: serde_json::Value) -> PipelineResult<()> {
        let mut documents = self.documents.lock().unwrap();
        let document = documents.get_mut(id).unwrap();
        document.flatten.complete(now);
        document.flattened_activities = Some(activities);
        Ok(())
    }
    async fn fail_flatten(&self, id: &DocumentId, error: String) -> PipelineResult<()> {
        self.documents.lock().unwrap().get_mut(id).unwrap().flatten.fail(error);
        Ok(())
    }
    async fn reset_unfinished_flatten(&self) -> PipelineResult<u64> {
        Ok(0)
    }

    async fn get_unlakified(&self) -> PipelineResult<Vec<Document>> {
        Ok(self.documents.lock().unwrap().values().filter(|d| d.is_unlakified()).cloned().collect())
    }
    async fn claim_lakify(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()> {
        self.documents.lock().unwrap().get_mut(id).unwrap().lakify.claim(now);
        Ok(())
    }
    async fn complete_lakify(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()> {
        self.documents.lock().unwrap().get_mut(id).unwrap().lakify.complete(now);
        Ok(())
    }
    async fn fail_lakify(&self, id: &DocumentId, error: String) -> PipelineResult<()> {
        self.documents.lock().unwrap().get_mut(id).unwrap().lakify.fail(error);
        Ok(())
    }
    async fn reset_unfinished_lakify(&self) -> PipelineResult<u64> {
        Ok(0)
    }

    async fn get_unsolrized(&self) -> PipelineResult<Vec<Document>> {
        Ok(self.documents.lock().unwrap().values().filter(|d| d.is_unsolrized()).cloned().collect())
    }
    async fn claim_solrize(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()> {
        self.documents.lock().unwrap().get_mut(id).unwrap().solrize.claim(now);
        Ok(())
    }
    async fn complete_solrize(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()> {
        self.documents.lock().unwrap().get_mut(id).unwrap().solrize.complete(now);
        Ok(())
    }
    async fn fail_solrize(&self, id: &DocumentId, error: String) -> PipelineResult<()> {
        self.documents.lock().unwrap().get_mut(id).unwrap().solrize.fail(error);
        Ok(())
    }
    async fn reset_unfinished_solrize(&self) -> PipelineResult<u64> {
        Ok(0)
    }
}

/// In-memory [`ObjectStoreRepository`]: one `HashMap` per container, plus a
/// tag index mirroring the marker-blob scheme `AzureObjectStoreRepository`
/// uses against the real backend.
#[derive(Default)]
struct FakeObjectStore {
    blobs: Mutex<HashMap<(Container, String), Bytes>>,
}

#[async_trait]
impl ObjectStoreRepository for FakeObjectStore {
    async fn upload_blob(&self, container: Container, blob_name: &str, bytes: Bytes) -> PipelineResult<()> {
        self.blobs.lock().unwrap().insert((container, blob_name.to_string()), bytes);
        Ok(())
    }
    async fn set_blob_tags(&self, _container: Container, _blob_name: &str, _tags: &[(&str, &str)]) -> PipelineResult<()> {
        Ok(())
    }
    async fn download_blob(&self, container: Container, blob_name: &str) -> PipelineResult<Option<Bytes>> {
        Ok(self.blobs.lock().unwrap().get(&(container, blob_name.to_string())).cloned())
    }
    async fn delete_blob(&self, container: Container, blob_name: &str) -> PipelineResult<()> {
        self.blobs.lock().unwrap().remove(&(container, blob_name.to_string()));
        Ok(())
    }
    async fn delete_blobs(&self, container: Container, blob_names: &[String]) -> PipelineResult<()> {
        let mut blobs = self.blobs.lock().unwrap();
        for name in blob_names {
            blobs.remove(&(container, name.clone()));
        }
        Ok(())
    }
    async fn find_blobs_by_tags(&self, _container: Container, _tag_key: &str, _tag_value: &str) -> PipelineResult<Vec<String>> {
        Ok(Vec::new())
    }
    async fn start_copy_from_url(&self, from: Container, from_blob: &str, to: Container, to_blob: &str) -> PipelineResult<()> {
        let bytes = self.blobs.lock().unwrap().get(&(from, from_blob.to_string())).cloned();
        if let Some(bytes) = bytes {
            self.blobs.lock().unwrap().insert((to, to_blob.to_string()), bytes);
        }
        Ok(())
    }
    async fn blob_exists(&self, container: Container, blob_name: &str) -> PipelineResult<bool> {
        Ok(self.blobs.lock().unwrap().contains_key(&(container, blob_name.to_string())))
    }
}

/// In-memory [`SearchIndexRepository`] recording the records posted per
/// core, enough to assert Solrize posted the expected records to the
/// expected cores with the expected composite ids.
#[derive(Default)]
struct FakeSearchIndex {
    cores: Mutex<HashMap<String, Vec<SolrRecord>>>,
    deleted: Mutex<Vec<DocumentId>>,
}

impl FakeSearchIndex {
    fn records(&self, core: &str) -> Vec<SolrRecord> {
        self.cores.lock().unwrap().get(core).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SearchIndexRepository for FakeSearchIndex {
    async fn ping(&self, _core: &str) -> PipelineResult<()> {
        Ok(())
    }
    async fn delete_document(&self, id: &DocumentId) -> PipelineResult<()> {
        self.deleted.lock().unwrap().push(id.clone());
        for records in self.cores.lock().unwrap().values_mut() {
            records.retain(|r| !r.id.starts_with(&format!("{}--", id.as_str())));
        }
        Ok(())
    }
    async fn add(&self, core: &str, records: Vec<SolrRecord>) -> PipelineResult<()> {
        self.cores.lock().unwrap().entry(core.to_string()).or_default().extend(records);
        Ok(())
    }
    async fn search(&self, _core: &str, _query: &str, _rows: u32) -> PipelineResult<serde_json::Value> {
        Ok(serde_json::json!({}))
    }
}

fn fresh_document() -> Document {
    let now = Utc::now();
    let mut document = Document::new_observed(
        DocumentId::new("doc-a"),
        ContentHash::new("H1"),
        "https://example.org/doc-a.xml".into(),
        None,
        PublisherId::new("pub-1"),
        "doc-a".into(),
        now,
    );
    document.clean.claim(now);
    document.clean.complete(now);
    document
}

/// S1-shaped: a cleaned document carries one activity through Flatten,
/// Lakify, and Solrize, ending up both in the object store's `lake`
/// container and posted to the search index.
#[tokio::test]
async fn flatten_lakify_solrize_chain_produces_searchable_activity() {
    let state_store = Arc::new(FakeStateStore::with_document(fresh_document()));
    let object_store = Arc::new(FakeObjectStore::default());
    let search_index = Arc::new(FakeSearchIndex::default());
    let id = DocumentId::new("doc-a");

    object_store.upload_blob(Container::Clean, &ContentHash::new("H1").blob_name(), Bytes::from_static(ACTIVITY_XML)).await.unwrap();

    let flatten_service: Arc<dyn FlattenService> = Arc::new(QuickXmlFlattenService::new(vec![]));
    let flatten_use_case = FlattenUseCase::new(state_store.clone(), object_store.clone(), flatten_service);
    let document = state_store.get(&id);
    flatten_use_case.process(&document).await;
    let document = state_store.get(&id);
    assert!(document.flatten.is_done());
    assert!(document.flattened_activities.is_some());

    let lakify_service: Arc<dyn LakifyService> = Arc::new(QuickXmlLakifyService::new());
    let lakify_use_case = LakifyUseCase::new(state_store.clone(), object_store.clone(), lakify_service);
    lakify_use_case.process(&document).await;
    let document = state_store.get(&id);
    assert!(document.lakify.is_done());

    let solrize_use_case = SolrizeUseCase::new(state_store.clone(), object_store.clone(), search_index.clone(), vec![], solrize_tunables());
    solrize_use_case.process(&document).await;
    let document = state_store.get(&id);
    assert!(document.solrize.is_done());

    let records = search_index.records(ACTIVITY_CORE);
    assert_eq!(records.len(), 1);
    assert!(records[0].id.starts_with("doc-a--"));
    assert_eq!(records[0].fields.get("iati_activities_document_id").and_then(|v| v.as_str()), Some("doc-a"));
    assert!(records[0].fields.get("iati_xml").and_then(|v| v.as_str()).unwrap().contains("AA-1"));
}

fn solrize_tunables() -> SolrizeTunables {
    SolrizeTunables { solrize_parallel_processes: 1, max_batch_length: 500 }
}

fn validate_tunables() -> ValidateTunables {
    ValidateTunables { validate_parallel_processes: 1, safety_check_period_hours: 2, safety_check_threshold: 5 }
}

fn refresh_tunables() -> RefreshTunables {
    RefreshTunables { refresh_parallel_processes: 1, retry_errors_after_loop: 10, publisher_safety_percentage: 50.0, document_safety_percentage: 50.0 }
}

/// Invariant 7 (`spec.md` §8): Lakify's blob key and Flatten's stored
/// `iati_identifier` normalise the same raw identifier to the same sha1,
/// which is exactly what lets Solrize find the Lakify output by identifier
/// alone.
#[tokio::test]
async fn lakify_hash_matches_flattened_identifier_normalisation() {
    let flatten_service = QuickXmlFlattenService::new(vec![]);
    let records = flatten_service.flatten(ACTIVITY_XML).unwrap();
    let iati_pipeline_domain::value_objects::FlattenedField::Scalar(identifier) = records[0].get("iati_identifier").unwrap().clone() else {
        panic!("iati_identifier must be a scalar")
    };
    assert_eq!(identifier, "AA-1");

    let lakify_service = QuickXmlLakifyService::new();
    let activities = lakify_service.explode(ACTIVITY_XML).unwrap();
    assert_eq!(activities.len(), 1);

    let expected_hash = {
        use sha1::{Digest, Sha1};
        let mut hasher = Sha1::new();
        hasher.update(iati_pipeline_domain::value_objects::normalize_identifier("  AA-1  ").as_bytes());
        hex::encode(hasher.finalize())
    };
    assert_eq!(activities[0].id_hash, expected_hash);
}

/// S6: when Solrize finds the lake blob missing, Lakify is the earliest
/// invalidated stage (the blob is Lakify's own output), so rewinding must
/// clear `lakify_*` and `solrize_*` — but leave Clean and Flatten's
/// already-valid output alone — per the spec's resolved "clear every
/// downstream column from the earliest invalidated stage forward" decision.
#[tokio::test]
async fn solrize_rewinds_lakify_onward_when_lake_blob_is_missing() {
    let now = Utc::now();
    let mut document = fresh_document();
    document.flatten.claim(now);
    document.flatten.complete(now);
    document.flattened_activities = Some(serde_json::json!([{"iati_identifier": "AA-1"}]));
    document.lakify.claim(now);
    document.lakify.complete(now);
    let id = document.id.clone();

    let state_store = Arc::new(FakeStateStore::with_document(document));
    let object_store = Arc::new(FakeObjectStore::default());
    let search_index = Arc::new(FakeSearchIndex::default());

    let document = state_store.get(&id);
    let solrize_use_case = SolrizeUseCase::new(state_store.clone(), object_store, search_index, vec![], solrize_tunables());
    solrize_use_case.process(&document).await;

    let document = state_store.get(&id);
    assert!(document.clean.is_done(), "clean predates the missing blob and must survive");
    assert!(document.flatten.is_done(), "flatten predates the missing blob and must survive");
    assert!(document.flattened_activities.is_some());
    assert!(document.lakify.is_claimable(), "lakify must be rewound");
    assert!(document.solrize.is_claimable(), "solrize must be rewound");
}

/// S4 (`spec.md` §8): a dataset containing the same `iati_identifier`
/// twice must not collapse into one Solr record — each occurrence gets its
/// own composite id `"<doc_id>--<id_hash>--<occurrence_index>"`.
#[tokio::test]
async fn duplicate_identifiers_get_distinct_composite_solr_ids() {
    let now = Utc::now();
    let mut document = fresh_document();
    document.flatten.claim(now);
    document.flatten.complete(now);
    document.flattened_activities = Some(serde_json::json!([
        {"iati_identifier": "DUP-1"},
        {"iati_identifier": "DUP-1"},
    ]));
    document.lakify.claim(now);
    document.lakify.complete(now);
    let id = document.id.clone();

    let id_hash = {
        use sha1::{Digest, Sha1};
        let mut hasher = Sha1::new();
        hasher.update(iati_pipeline_domain::value_objects::normalize_identifier("DUP-1").as_bytes());
        hex::encode(hasher.finalize())
    };
    let blob_prefix = format!("doc-a/{id_hash}");

    let state_store = Arc::new(FakeStateStore::with_document(document));
    let object_store = Arc::new(FakeObjectStore::default());
    object_store.upload_blob(Container::Lake, &format!("{blob_prefix}.xml"), Bytes::from_static(ACTIVITY_XML)).await.unwrap();
    object_store.upload_blob(Container::Lake, &format!("{blob_prefix}.json"), Bytes::from_static(b"{}")).await.unwrap();
    let search_index = Arc::new(FakeSearchIndex::default());

    let document = state_store.get(&id);
    let solrize_use_case = SolrizeUseCase::new(state_store.clone(), object_store, search_index.clone(), vec![], solrize_tunables());
    solrize_use_case.process(&document).await;

    let mut records = search_index.records(ACTIVITY_CORE);
    records.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, format!("doc-a--{id_hash}--0"));
    assert_eq!(records[1].id, format!("doc-a--{id_hash}--1"));
}

/// An in-memory [`BulkDataServiceClient`] returning canned index bodies,
/// enough to drive [`RefreshUseCase::run`] without a real BDS.
struct FakeBulkDataServiceClient {
    orgs: Vec<ReportingOrg>,
    datasets: Vec<DatasetEntry>,
    index_created_unix_timestamp: i64,
}

#[async_trait]
impl BulkDataServiceClient for FakeBulkDataServiceClient {
    async fn fetch_reporting_orgs(&self, _if_none_match: Option<&str>) -> PipelineResult<IndexFetch<ReportingOrg>> {
        Ok(IndexFetch::Fresh { etag: None, index_created_unix_timestamp: self.index_created_unix_timestamp, entries: self.orgs.clone() })
    }
    async fn fetch_datasets(&self, _if_none_match: Option<&str>) -> PipelineResult<IndexFetch<DatasetEntry>> {
        Ok(IndexFetch::Fresh { etag: None, index_created_unix_timestamp: self.index_created_unix_timestamp, entries: self.datasets.clone() })
    }
    async fn download_dataset(&self, _url: &str) -> PipelineResult<(Option<String>, Bytes)> {
        Ok((None, Bytes::new()))
    }
}

/// S2 (`spec.md` §8): a dataset reported by BDS with an unchanged id but a
/// new hash resets every downstream stage column, exactly like
/// `Document::apply_hash_change`, but driven through `RefreshUseCase::run`
/// end to end rather than calling the entity method directly.
#[tokio::test]
async fn refresh_pass_with_changed_hash_resets_every_stage_column() {
    let now = Utc::now();
    let mut document = fresh_document();
    document.downloaded = Some(now);
    document.file_schema_valid = Some(true);
    document.flatten.claim(now);
    document.flatten.complete(now);
    document.flattened_activities = Some(serde_json::json!([{"iati_identifier": "AA-1"}]));
    document.lakify.claim(now);
    document.lakify.complete(now);
    document.solrize.claim(now);
    document.solrize.complete(now);
    let id = document.id.clone();

    let state_store = Arc::new(FakeStateStore::with_document(document));
    let object_store = Arc::new(FakeObjectStore::default());
    let search_index = Arc::new(FakeSearchIndex::default());
    let bulk_data_service = Arc::new(FakeBulkDataServiceClient {
        orgs: vec![],
        datasets: vec![DatasetEntry {
            id: "doc-a".into(),
            hash: "H2".into(),
            url: "https://example.org/doc-a.xml".into(),
            cache_url: None,
            publisher: PublisherId::new("pub-1"),
            name: "doc-a".into(),
        }],
        index_created_unix_timestamp: 100,
    });

    let refresh_use_case = RefreshUseCase::new(state_store.clone(), bulk_data_service, object_store, search_index, refresh_tunables(), 1000);
    refresh_use_case.run(None, None).await.unwrap();

    let document = state_store.get(&id);
    assert_eq!(document.hash, ContentHash::new("H2"));
    assert!(document.downloaded.is_none());
    assert!(document.file_schema_valid.is_none());
    assert!(document.clean.is_claimable());
    assert!(document.flatten.is_claimable());
    assert!(document.flattened_activities.is_none());
    assert!(document.lakify.is_claimable());
    assert!(document.solrize.is_claimable());
}

/// S3 (`spec.md` §8, §4.3 step 3): a dataset count far below the known
/// document count trips the safety check and aborts the whole pass with
/// `PipelineError::HardStop`, leaving every existing document untouched.
#[tokio::test]
async fn refresh_pass_aborts_on_document_safety_check_breach() {
    let now = Utc::now();
    let mut documents = HashMap::new();
    for n in 0..10 {
        let id = DocumentId::new(format!("doc-{n}"));
        let document = Document::new_observed(id.clone(), ContentHash::new("H1"), format!("https://example.org/{n}.xml"), None, PublisherId::new("pub-1"), format!("doc-{n}"), now);
        documents.insert(id, document);
    }
    let state_store = Arc::new(FakeStateStore { documents: Mutex::new(documents) });
    let object_store = Arc::new(FakeObjectStore::default());
    let search_index = Arc::new(FakeSearchIndex::default());
    let bulk_data_service = Arc::new(FakeBulkDataServiceClient {
        orgs: vec![],
        datasets: vec![DatasetEntry {
            id: "doc-0".into(),
            hash: "H1".into(),
            url: "https://example.org/0.xml".into(),
            cache_url: None,
            publisher: PublisherId::new("pub-1"),
            name: "doc-0".into(),
        }],
        index_created_unix_timestamp: 100,
    });

    let refresh_use_case = RefreshUseCase::new(state_store.clone(), bulk_data_service, object_store, search_index, refresh_tunables(), 1000);
    let result = refresh_use_case.run(None, None).await;

    assert!(matches!(result, Err(PipelineError::HardStop(_))));
    assert_eq!(state_store.get(&DocumentId::new("doc-0")).hash, ContentHash::new("H1"), "an aborted pass must not have upserted anything");
}

/// An in-memory [`ValidationServiceClient`] that panics if called, used to
/// assert `ValidateUseCase::process` skips before ever reaching the
/// external validator.
#[derive(Default)]
struct PanicOnCallValidationService;

#[async_trait]
impl ValidationServiceClient for PanicOnCallValidationService {
    async fn validate(&self, _xml: &[u8]) -> PipelineResult<ValidationOutcome> {
        panic!("validate must not be called while the document is within its safety window");
    }
    async fn check_schema(&self, _xml: &[u8]) -> PipelineResult<ValidationOutcome> {
        panic!("check_schema must not be called while the document is within its safety window");
    }
}

/// S5 (`spec.md` §8, §4.5): a document whose last schema check failed and
/// whose safety window hasn't elapsed yet is skipped outright — no claim,
/// no download, no call to the validation service.
#[tokio::test]
async fn validate_skips_document_within_safety_window() {
    let now = Utc::now();
    let mut document = fresh_document();
    document.downloaded = Some(now);
    document.file_schema_valid = Some(false);
    let id = document.id.clone();

    let state_store = Arc::new(FakeStateStore::with_document(document));
    let object_store = Arc::new(FakeObjectStore::default());
    let validation_service = Arc::new(PanicOnCallValidationService);

    let validate_use_case = ValidateUseCase::new(state_store.clone(), validation_service, object_store, validate_tunables());
    let document = state_store.get(&id);
    validate_use_case.process(&document).await;

    let document = state_store.get(&id);
    assert!(document.validation_request.is_none(), "a skipped document must never be claimed");
}
