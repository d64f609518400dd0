// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Solrize use case (`spec.md` §4.10).
//!
//! One Solr core per explode element plus the `activity` core
//! (`spec.md` §2). Per document: ping every core, delete every prior
//! entry for the document from every core, then post the activity record
//! (composite id `"<doc_id>--<id_hash>--<occurrence_index>"`, never
//! collapsing duplicated identifiers) and, for each explode element, its
//! per-occurrence child records (id `sha1(serialisation + child_index)`)
//! to their own core.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{info, warn};

use iati_pipeline_domain::entities::{Document, Stage};
use iati_pipeline_domain::error::PipelineResult;
use iati_pipeline_domain::repositories::{Container, ObjectStoreRepository, SearchIndexRepository, SolrRecord, StateStoreRepository, ACTIVITY_CORE};
use iati_pipeline_domain::value_objects::{normalize_identifier, ExplodeElement};

use crate::infrastructure::config::SolrizeTunables;
use crate::infrastructure::lakify::sha1_hex;

pub struct SolrizeUseCase {
    state_store: Arc<dyn StateStoreRepository>,
    object_store: Arc<dyn ObjectStoreRepository>,
    search_index: Arc<dyn SearchIndexRepository>,
    explode_elements: Vec<ExplodeElement>,
    tunables: SolrizeTunables,
}

impl SolrizeUseCase {
    pub fn new(
        state_store: Arc<dyn StateStoreRepository>,
        object_store: Arc<dyn ObjectStoreRepository>,
        search_index: Arc<dyn SearchIndexRepository>,
        explode_elements: Vec<ExplodeElement>,
        tunables: SolrizeTunables,
    ) -> Self {
        Self { state_store, object_store, search_index, explode_elements, tunables }
    }

    pub async fn candidates(&self) -> PipelineResult<Vec<Document>> {
        self.state_store.get_unsolrized().await
    }

    pub async fn process(&self, document: &Document) {
        let Some(Value::Array(activities)) = document.flattened_activities.clone() else {
            warn!(document = %document.id, "flattened activities not found, cannot solrize");
            let _ = self.state_store.fail_solrize(&document.id, "Flattened activities not found".into()).await;
            return;
        };
        if activities.is_empty() {
            warn!(document = %document.id, "flattened activities empty, cannot solrize");
            let _ = self.state_store.fail_solrize(&document.id, "Flattened activities not found".into()).await;
            return;
        }

        if let Err(e) = self.search_index.ping(ACTIVITY_CORE).await {
            warn!(document = %document.id, core = ACTIVITY_CORE, error = %e, "solr ping failed, will retry next pass");
            return;
        }
        for element in &self.explode_elements {
            if let Err(e) = self.search_index.ping(element.collection_name()).await {
                warn!(document = %document.id, core = element.collection_name(), error = %e, "solr ping failed, will retry next pass");
                return;
            }
        }

        if let Err(e) = self.state_store.claim_solrize(&document.id, Utc::now()).await {
            warn!(document = %document.id, error = %e, "failed to claim solrize");
            return;
        }

        if let Err(e) = self.search_index.delete_document(&document.id).await {
            warn!(document = %document.id, error = %e, "solr delete-before-insert failed, retrying next pass");
            let _ = self.state_store.fail_solrize(&document.id, e.to_string()).await;
            return;
        }

        let mut activity_records = Vec::with_capacity(activities.len());
        let mut child_records_by_core: HashMap<String, Vec<SolrRecord>> = HashMap::new();
        let mut occurrence_by_hash: HashMap<String, u32> = HashMap::new();
        let mut child_index_by_element: HashMap<String, u64> = HashMap::new();

        for activity in &activities {
            let Some(record) = activity.as_object().cloned() else { continue };
            let identifier = record.get("iati_identifier").and_then(Value::as_str).map(normalize_identifier).unwrap_or_default();
            let id_hash = sha1_hex(&identifier);
            let blob_prefix = format!("{}/{}", document.id.as_str(), id_hash);

            let occurrence = occurrence_by_hash.entry(id_hash.clone()).or_insert(0);
            let composite_id = format!("{}--{}--{}", document.id.as_str(), id_hash, *occurrence);
            *occurrence += 1;

            let xml = match self.object_store.download_blob(Container::Lake, &format!("{blob_prefix}.xml")).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    warn!(document = %document.id, %id_hash, "lake xml missing, sending back to Lakify");
                    if let Err(e) = self.state_store.rewind_document(&document.id, Stage::Lakify).await {
                        warn!(document = %document.id, error = %e, "failed to rewind document to Lakify");
                    }
                    return;
                }
                Err(e) => {
                    warn!(document = %document.id, error = %e, "failed to download lake xml blob");
                    return;
                }
            };
            let json = match self.object_store.download_blob(Container::Lake, &format!("{blob_prefix}.json")).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    warn!(document = %document.id, %id_hash, "lake json missing, sending back to Lakify");
                    if let Err(e) = self.state_store.rewind_document(&document.id, Stage::Lakify).await {
                        warn!(document = %document.id, error = %e, "failed to rewind document to Lakify");
                    }
                    return;
                }
                Err(e) => {
                    warn!(document = %document.id, error = %e, "failed to download lake json blob");
                    return;
                }
            };

            let xml_text = match String::from_utf8(xml.to_vec()) {
                Ok(text) => text,
                Err(e) => {
                    warn!(document = %document.id, error = %e, "lake xml blob has invalid charset");
                    let _ = self.state_store.fail_solrize(&document.id, "invalid charset in lake xml blob".into()).await;
                    return;
                }
            };
            let json_text = String::from_utf8_lossy(&json).to_string();

            for element in &self.explode_elements {
                let Some(Value::Array(children)) = record.get(&element.sub_list_key()) else { continue };
                for child in children {
                    let Some(child_fields) = child.as_object() else { continue };
                    let merged = merge_child_record(&record, child_fields, element, &document_tags(document, &xml_text, &json_text));
                    let serialisation = serde_json::to_string(&merged).unwrap_or_default();
                    let child_index = child_index_by_element.entry(element.as_str().to_string()).or_insert(0);
                    let child_id = sha1_hex(&format!("{serialisation}{child_index}"));
                    *child_index += 1;
                    child_records_by_core
                        .entry(element.as_str().to_string())
                        .or_default()
                        .push(SolrRecord { id: child_id, fields: Value::Object(merged) });
                }
            }

            let mut activity_fields = record.clone();
            for element in &self.explode_elements {
                activity_fields.remove(&element.sub_list_key());
            }
            for (key, value) in document_tags(document, &xml_text, &json_text) {
                activity_fields.insert(key, value);
            }
            activity_records.push(SolrRecord { id: composite_id, fields: Value::Object(activity_fields) });
        }

        for chunk in activity_records.chunks(self.tunables.max_batch_length as usize) {
            if let Err(e) = self.search_index.add(ACTIVITY_CORE, chunk.to_vec()).await {
                warn!(document = %document.id, error = %e, "solr add to activity core failed, cleaning up partial state");
                let _ = self.search_index.delete_document(&document.id).await;
                let _ = self.state_store.fail_solrize(&document.id, e.to_string()).await;
                return;
            }
        }
        for (core, records) in child_records_by_core {
            for chunk in records.chunks(self.tunables.max_batch_length as usize) {
                if let Err(e) = self.search_index.add(&core, chunk.to_vec()).await {
                    warn!(document = %document.id, core, error = %e, "solr add to explode-element core failed, cleaning up partial state");
                    let _ = self.search_index.delete_document(&document.id).await;
                    let _ = self.state_store.fail_solrize(&document.id, e.to_string()).await;
                    return;
                }
            }
        }

        match self.state_store.complete_solrize(&document.id, Utc::now()).await {
            Ok(()) => info!(document = %document.id, "solrized"),
            Err(e) => warn!(document = %document.id, error = %e, "failed to record solrize completion"),
        }
    }
}

/// Fields every record posted for a document carries, regardless of core.
fn document_tags(document: &Document, xml_text: &str, json_text: &str) -> Vec<(String, Value)> {
    vec![
        ("iati_xml".to_string(), Value::String(xml_text.to_string())),
        ("iati_json".to_string(), Value::String(json_text.to_string())),
        ("iati_activities_document_id".to_string(), Value::String(document.id.as_str().to_string())),
        ("iati_activities_document_hash".to_string(), Value::String(document.hash.as_str().to_string())),
    ]
}

/// Builds one explode-element child record: every non-`<element>_`-prefixed
/// field from the activity, overlaid with the child's own fields
/// (`spec.md` §4.10 step 4's last bullet).
fn merge_child_record(activity: &Map<String, Value>, child_fields: &Map<String, Value>, element: &ExplodeElement, tags: &[(String, Value)]) -> Map<String, Value> {
    let own_prefix = format!("{}_", element.as_str());
    let mut merged: Map<String, Value> = activity
        .iter()
        .filter(|(key, _)| !key.starts_with('@') && !key.starts_with(&own_prefix))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    for (key, value) in child_fields {
        merged.insert(key.clone(), value.clone());
    }
    for (key, value) in tags {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
