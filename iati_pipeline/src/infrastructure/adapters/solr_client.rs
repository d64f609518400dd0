// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `reqwest`-backed [`SearchIndexRepository`] (`spec.md` §4.10): talks to
//! one Solr core per configured explode element plus the `activity` core,
//! each reachable at `<SEARCH_INDEX_URL>/<core>/<handler>`.
//!
//! `delete_document` never skips a core's delete-by-query, even when the
//! caller knows a core will get no new records this pass — a document that
//! lost every occurrence of an explode element on re-flatten still needs
//! its stale child records gone from that core.

use async_trait::async_trait;
use serde_json::json;

use iati_pipeline_domain::error::{PipelineError, PipelineResult};
use iati_pipeline_domain::repositories::{SearchIndexRepository, SolrRecord, ACTIVITY_CORE};
use iati_pipeline_domain::value_objects::DocumentId;

use crate::infrastructure::config::SearchIndexConfig;

const SERVICE: &str = "search-index";

pub struct SolrSearchIndexRepository {
    client: reqwest::Client,
    config: SearchIndexConfig,
    cores: Vec<String>,
}

impl SolrSearchIndexRepository {
    pub fn new(config: SearchIndexConfig, explode_elements: &[String]) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PipelineError::InvalidConfiguration(format!("failed to build HTTP client: {e}")))?;
        let mut cores = vec![ACTIVITY_CORE.to_string()];
        cores.extend(explode_elements.iter().cloned());
        Ok(Self { client, config, cores })
    }

    fn core_url(&self, core: &str, handler: &str) -> String {
        format!("{}/{}/{}", self.config.url, core, handler)
    }

    async fn update(&self, core: &str, body: serde_json::Value) -> PipelineResult<()> {
        let mut attempt = 0;
        loop {
            let response = self
                .client
                .post(self.core_url(core, "update"))
                .basic_auth(&self.config.username, Some(&self.config.password))
                .query(&[("commit", "true")])
                .json(&body)
                .send()
                .await
                .map_err(|e| PipelineError::upstream(SERVICE, e.to_string()))?;

            if response.status().is_success() {
                return Ok(());
            }
            if response.status().as_u16() == 500 && attempt == 0 {
                attempt += 1;
                tokio::time::sleep(self.config.solr_500_sleep).await;
                continue;
            }
            return Err(PipelineError::upstream(SERVICE, format!("update on core {core} rejected with status {}", response.status())));
        }
    }

    fn delete_by_document_id(id: &DocumentId) -> serde_json::Value {
        json!({ "delete": { "query": format!("iati_activities_document_id:{}", id.as_str()) } })
    }
}

#[async_trait]
impl SearchIndexRepository for SolrSearchIndexRepository {
    async fn ping(&self, core: &str) -> PipelineResult<()> {
        let response = self
            .client
            .get(self.core_url(core, "admin/ping"))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await
            .map_err(|e| PipelineError::upstream(SERVICE, e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(PipelineError::upstream(SERVICE, format!("ping on core {core} failed with status {}", response.status())))
        }
    }

    async fn delete_document(&self, id: &DocumentId) -> PipelineResult<()> {
        for core in &self.cores {
            self.update(core, Self::delete_by_document_id(id)).await?;
        }
        Ok(())
    }

    async fn add(&self, core: &str, records: Vec<SolrRecord>) -> PipelineResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let docs: Vec<_> = records
            .into_iter()
            .map(|record| {
                let SolrRecord { id, fields } = record;
                let mut fields = fields;
                if let serde_json::Value::Object(ref mut map) = fields {
                    map.insert("id".to_string(), serde_json::Value::String(id));
                }
                json!({ "doc": fields })
            })
            .collect();
        self.update(core, json!({ "add": docs })).await
    }

    async fn search(&self, core: &str, query: &str, rows: u32) -> PipelineResult<serde_json::Value> {
        let response = self
            .client
            .get(self.core_url(core, "select"))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .query(&[("q", query), ("rows", &rows.to_string()), ("wt", "json")])
            .send()
            .await
            .map_err(|e| PipelineError::upstream(SERVICE, e.to_string()))?;
        if !response.status().is_success() {
            return Err(PipelineError::upstream(SERVICE, format!("search on core {core} failed with status {}", response.status())));
        }
        response.json().await.map_err(|e| PipelineError::upstream(SERVICE, e.to_string()))
    }
}
