// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `reqwest`-backed [`BulkDataServiceClient`], ETag-aware per `spec.md` §4.1:
//! a pass that finds nothing new sends one conditional `GET` and parses
//! nothing. Transport failures are mapped into [`PipelineError::Upstream`]
//! at this boundary so the rest of the pipeline never sees a `reqwest`
//! error type.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use iati_pipeline_domain::error::{PipelineError, PipelineResult};
use iati_pipeline_domain::repositories::{BulkDataServiceClient, DatasetEntry, IndexFetch, ReportingOrg};
use iati_pipeline_domain::value_objects::PublisherId;

use crate::infrastructure::config::BulkDataServiceConfig;

const SERVICE: &str = "bulk-data-service";

pub struct ReqwestBulkDataServiceClient {
    client: Client,
    config: BulkDataServiceConfig,
}

impl ReqwestBulkDataServiceClient {
    pub fn new(config: BulkDataServiceConfig) -> PipelineResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PipelineError::InvalidConfiguration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn fetch_index<T, F>(&self, url: &str, if_none_match: Option<&str>, items_key: &str, into_entry: F) -> PipelineResult<IndexFetch<T>>
    where
        F: Fn(serde_json::Value) -> Option<T>,
    {
        let mut request = self.client.get(url);
        if let Some(etag) = if_none_match {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag);
        }

        let response = request.send().await.map_err(map_transport_error)?;

        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(IndexFetch::NotModified);
        }
        if !response.status().is_success() {
            return Err(PipelineError::upstream(SERVICE, format!("unexpected status {}", response.status())));
        }

        let etag = response.headers().get(reqwest::header::ETAG).and_then(|v| v.to_str().ok()).map(str::to_string);
        let mut body: RawIndex = response.json().await.map_err(map_transport_error)?;
        let index_created_unix_timestamp = body.index_created_unix_timestamp;
        let items = body.items.remove(items_key).unwrap_or_default();
        let entries = items.into_iter().filter_map(into_entry).collect();
        Ok(IndexFetch::Fresh { etag, index_created_unix_timestamp, entries })
    }
}

/// Both BDS index bodies share this envelope (`spec.md` §6): a generation
/// timestamp alongside one named array (`datasets` or `reporting_orgs`).
#[derive(Deserialize)]
struct RawIndex {
    index_created_unix_timestamp: i64,
    #[serde(flatten)]
    items: std::collections::HashMap<String, Vec<serde_json::Value>>,
}

#[derive(Deserialize)]
struct RawReportingOrg {
    #[serde(rename = "org-id")]
    org_id: String,
    #[serde(rename = "short-name")]
    short_name: String,
    title: String,
    #[serde(rename = "iati-identifier")]
    iati_identifier: Option<String>,
}

#[derive(Deserialize)]
struct RawDataset {
    id: String,
    hash: String,
    url: String,
    #[serde(rename = "cache-url")]
    cache_url: Option<String>,
    publisher: String,
    name: String,
}

#[async_trait]
impl BulkDataServiceClient for ReqwestBulkDataServiceClient {
    async fn fetch_reporting_orgs(&self, if_none_match: Option<&str>) -> PipelineResult<IndexFetch<ReportingOrg>> {
        self.fetch_index(&self.config.reporting_org_index_url, if_none_match, "reporting_orgs", |raw| {
            let raw: RawReportingOrg = serde_json::from_value(raw).ok()?;
            Some(ReportingOrg {
                org_id: PublisherId::new(raw.org_id),
                short_name: raw.short_name,
                title: raw.title,
                iati_identifier: raw.iati_identifier,
            })
        })
        .await
    }

    async fn fetch_datasets(&self, if_none_match: Option<&str>) -> PipelineResult<IndexFetch<DatasetEntry>> {
        let head = self.client.head(&self.config.dataset_index_url).send().await.map_err(map_transport_error)?;
        if head.headers().get(reqwest::header::ETAG).is_none() {
            return Err(PipelineError::upstream(SERVICE, "HEAD on dataset index returned no ETag header"));
        }

        self.fetch_index(&self.config.dataset_index_url, if_none_match, "datasets", |raw| {
            let raw: RawDataset = serde_json::from_value(raw).ok()?;
            Some(DatasetEntry {
                id: raw.id,
                hash: raw.hash,
                url: raw.url,
                cache_url: raw.cache_url,
                publisher: PublisherId::new(raw.publisher),
                name: raw.name,
            })
        })
        .await
    }

    async fn download_dataset(&self, url: &str) -> PipelineResult<(Option<String>, bytes::Bytes)> {
        let response = self.client.get(url).send().await.map_err(map_transport_error)?;
        if !response.status().is_success() {
            return Err(PipelineError::upstream(SERVICE, format!("unexpected status {}", response.status())));
        }
        let content_type = response.headers().get(reqwest::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(str::to_string);
        let bytes = response.bytes().await.map_err(map_transport_error)?;
        Ok((content_type, bytes))
    }
}

/// Maps connection/timeout failures into [`PipelineError::Upstream`]; other
/// `reqwest` errors (body decode, redirect policy) still count as upstream
/// failures since they are never the caller's fault.
fn map_transport_error(e: reqwest::Error) -> PipelineError {
    PipelineError::upstream(SERVICE, e.to_string())
}
