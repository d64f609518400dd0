// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The State Store port (`spec.md` §4.1): a narrow, transactional API over
//! the relational model that every stage worker uses to claim, progress,
//! and recover documents and publishers.
//!
//! This trait is implemented once, by
//! `iati_pipeline::infrastructure::repositories::postgres_state_store`.
//! Keeping it a trait in the domain crate (rather than calling `sqlx`
//! directly from use-cases) is what lets the six end-to-end scenarios in
//! `spec.md` §8 run against a fake in unit tests and against real Postgres
//! in integration tests without duplicating stage logic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{Document, Publisher, Stage, ValidationReport};
use crate::error::PipelineResult;
use crate::value_objects::{ContentHash, DocumentId, PublisherId};

/// One row of the Bulk Data Service dataset index, as Refresh observes it.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetObservation {
    pub id: DocumentId,
    pub hash: ContentHash,
    pub url: String,
    pub bds_cache_url: Option<String>,
    pub publisher: PublisherId,
    pub name: String,
}

/// The result of upserting one dataset observation: distinguishes a newly
/// seen document from one whose hash changed (triggering a downstream
/// reset) from one that is simply re-stamped `last_seen`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Unchanged,
    HashChanged { old_hash: ContentHash },
}

/// A document eligible for the Download stage: just enough to fetch and
/// record the outcome, per `get_refresh_candidates` in `spec.md` §4.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshCandidate {
    pub id: DocumentId,
    pub hash: ContentHash,
    pub bds_cache_url: Option<String>,
}

#[async_trait]
pub trait StateStoreRepository: Send + Sync {
    // ---- Schema Version Gate (spec.md §4.2) -----------------------------
    async fn get_schema_version(&self) -> PipelineResult<Option<(String, i64)>>;
    async fn set_schema_version(&self, number: &str, migration: i64) -> PipelineResult<()>;

    // ---- Publishers -------------------------------------------------------
    async fn get_num_publishers(&self) -> PipelineResult<i64>;
    async fn upsert_publisher_seen(&self, publisher: &Publisher) -> PipelineResult<()>;
    async fn get_publisher(&self, id: &PublisherId) -> PipelineResult<Option<Publisher>>;
    async fn get_publishers_not_seen_after(&self, pass_start: DateTime<Utc>) -> PipelineResult<Vec<PublisherId>>;
    async fn remove_publishers_not_seen_after(&self, pass_start: DateTime<Utc>) -> PipelineResult<u64>;

    /// Publishers whose count of documents with `file_schema_valid = false`
    /// in the last `period` hours exceeds `threshold` and are not already
    /// black-flagged (`spec.md` §4.6).
    async fn get_black_flag_candidates(&self, threshold: i64, since: DateTime<Utc>) -> PipelineResult<Vec<PublisherId>>;
    async fn set_black_flag(&self, id: &PublisherId, now: DateTime<Utc>) -> PipelineResult<()>;
    async fn clear_black_flag(&self, id: &PublisherId) -> PipelineResult<()>;
    async fn get_publishers_needing_black_flag_notification(&self) -> PipelineResult<Vec<Publisher>>;
    async fn mark_black_flag_notified(&self, id: &PublisherId) -> PipelineResult<()>;

    // ---- Refresh / documents ----------------------------------------------
    async fn get_num_documents(&self) -> PipelineResult<i64>;
    async fn insert_or_update_document(&self, observation: &DatasetObservation, now: DateTime<Utc>) -> PipelineResult<UpsertOutcome>;
    async fn get_files_not_seen_after(&self, pass_start: DateTime<Utc>) -> PipelineResult<Vec<(DocumentId, ContentHash)>>;
    async fn remove_files_not_seen_after(&self, pass_start: DateTime<Utc>) -> PipelineResult<u64>;
    async fn get_files_from_publishers_not_seen_after(&self, pass_start: DateTime<Utc>) -> PipelineResult<Vec<(DocumentId, ContentHash)>>;
    async fn get_document(&self, id: &DocumentId) -> PipelineResult<Option<Document>>;
    async fn rewind_document(&self, id: &DocumentId, from_stage: Stage) -> PipelineResult<()>;

    // ---- Download -----------------------------------------------------------
    async fn get_refresh_candidates(&self, retry_errors: bool) -> PipelineResult<Vec<RefreshCandidate>>;
    async fn mark_downloaded(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()>;
    async fn mark_download_error(&self, id: &DocumentId, code: i32) -> PipelineResult<()>;

    // ---- Validate -----------------------------------------------------------
    async fn get_unvalidated(&self) -> PipelineResult<Vec<Document>>;
    async fn claim_validation(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()>;
    async fn set_file_schema_valid(&self, id: &DocumentId, valid: bool) -> PipelineResult<()>;
    async fn set_validation_api_error(&self, id: &DocumentId, status: i32) -> PipelineResult<()>;
    /// Inserts the report and repoints `Document.validation` to it,
    /// clearing `regenerate_validation_report`, in a single transaction.
    async fn update_validation_state(&self, report: &ValidationReport) -> PipelineResult<i64>;
    async fn get_validation_report(&self, id: i64) -> PipelineResult<Option<ValidationReport>>;

    // ---- Clean --------------------------------------------------------------
    async fn get_valid_to_copy(&self) -> PipelineResult<Vec<(Document, ValidationReport)>>;
    async fn get_invalid_to_clean(&self) -> PipelineResult<Vec<(Document, ValidationReport)>>;
    async fn claim_clean(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()>;
    async fn complete_clean(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()>;
    async fn fail_clean(&self, id: &DocumentId, error: String) -> PipelineResult<()>;
    async fn reset_unfinished_clean(&self) -> PipelineResult<u64>;

    // ---- Flatten --------------------------------------------------------------
    async fn get_unflattened(&self) -> PipelineResult<Vec<Document>>;
    async fn claim_flatten(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()>;
    async fn complete_flatten(&self, id: &DocumentId, now: DateTime<Utc>, activities: serde_json::Value) -> PipelineResult<()>;
    async fn fail_flatten(&self, id: &DocumentId, error: String) -> PipelineResult<()>;
    async fn reset_unfinished_flatten(&self) -> PipelineResult<u64>;

    // ---- Lakify --------------------------------------------------------------
    async fn get_unlakified(&self) -> PipelineResult<Vec<Document>>;
    async fn claim_lakify(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()>;
    async fn complete_lakify(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()>;
    async fn fail_lakify(&self, id: &DocumentId, error: String) -> PipelineResult<()>;
    async fn reset_unfinished_lakify(&self) -> PipelineResult<u64>;

    // ---- Solrize --------------------------------------------------------------
    async fn get_unsolrized(&self) -> PipelineResult<Vec<Document>>;
    async fn claim_solrize(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()>;
    async fn complete_solrize(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()>;
    async fn fail_solrize(&self, id: &DocumentId, error: String) -> PipelineResult<()>;
    async fn reset_unfinished_solrize(&self) -> PipelineResult<u64>;
}
