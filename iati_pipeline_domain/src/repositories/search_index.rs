// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The Search Index port (`spec.md` §2, §4.10): one core per explode
//! element plus an `activity` core. Documents are keyed by a composite id
//! and tagged with `iati_activities_document_id` so a whole document's
//! entries can be deleted from every core in one call.
//!
//! Per the spec's resolved Open Question, that delete-then-insert is
//! always naive — never the dupe-aware variant the original project also
//! supported. There is exactly one way to reindex a document in this
//! pipeline; the only fan-out is across cores, not across delete strategies.

use async_trait::async_trait;

use crate::error::PipelineResult;
use crate::value_objects::DocumentId;

/// The core holding whole-activity records, as opposed to the per-explode-
/// element child cores named after their element (`transaction`, `budget`, ...).
pub const ACTIVITY_CORE: &str = "activity";

/// One record ready to post to a Solr core: an explicit id, assigned by the
/// caller per `spec.md` §4.10's composite/child id schemes, plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SolrRecord {
    pub id: String,
    pub fields: serde_json::Value,
}

#[async_trait]
pub trait SearchIndexRepository: Send + Sync {
    async fn ping(&self, core: &str) -> PipelineResult<()>;

    /// Deletes every `iati_activities_document_id:<id>` entry from every
    /// configured core (activity + each explode element) in one call. Used
    /// both by Solrize's delete-before-insert and the stale-document
    /// cleanup protocol (`spec.md` §4.11).
    async fn delete_document(&self, id: &DocumentId) -> PipelineResult<()>;

    /// Adds a batch of records to the named core and commits. The caller is
    /// responsible for chunking to `MAX_BATCH_LENGTH`.
    async fn add(&self, core: &str, records: Vec<SolrRecord>) -> PipelineResult<()>;

    async fn search(&self, core: &str, query: &str, rows: u32) -> PipelineResult<serde_json::Value>;
}
