// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The Bulk Data Service port (`spec.md` §4.1, §4.3): the upstream catalogue
//! of publishers and datasets that Refresh and Download read from. Both
//! methods are ETag-aware so a pass that finds nothing new costs one
//! conditional request instead of a full re-fetch.

use async_trait::async_trait;

use crate::error::PipelineResult;
use crate::value_objects::PublisherId;

/// One reporting-org entry from the BDS organisation index.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportingOrg {
    pub org_id: PublisherId,
    pub short_name: String,
    pub title: String,
    pub iati_identifier: Option<String>,
}

/// One dataset entry from the BDS dataset index.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetEntry {
    pub id: String,
    pub hash: String,
    pub url: String,
    pub cache_url: Option<String>,
    pub publisher: PublisherId,
    pub name: String,
}

/// An index fetch result: `NotModified` when the upstream ETag matches the
/// one passed in, sparing the caller a parse of an unchanged multi-megabyte
/// JSON body. `index_created_unix_timestamp` is the index object's own
/// generation stamp (`spec.md` §4.3 step 1, §6), used to abort a pass that
/// would otherwise join a dataset index against a reporting-org index from
/// a different BDS run.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexFetch<T> {
    NotModified,
    Fresh { etag: Option<String>, index_created_unix_timestamp: i64, entries: Vec<T> },
}

#[async_trait]
pub trait BulkDataServiceClient: Send + Sync {
    async fn fetch_reporting_orgs(&self, if_none_match: Option<&str>) -> PipelineResult<IndexFetch<ReportingOrg>>;

    /// Also performs the `HEAD <BDS_DATASET_INDEX_URL>` check mandated by
    /// `spec.md` §6: a missing `ETag` header on that response is a hard
    /// error, distinct from the body's own `GET`-carried ETag used for
    /// conditional re-fetch.
    async fn fetch_datasets(&self, if_none_match: Option<&str>) -> PipelineResult<IndexFetch<DatasetEntry>>;

    /// Downloads the raw dataset bytes, preferring `cache_url` when given.
    /// Returns the content-type header (for charset negotiation) alongside
    /// the body.
    async fn download_dataset(&self, url: &str) -> PipelineResult<(Option<String>, bytes::Bytes)>;
}
