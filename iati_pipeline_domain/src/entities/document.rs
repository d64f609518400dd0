// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The central aggregate of the pipeline: one XML dataset as it advances
//! through Download → Validate → Clean → Flatten → Lakify → Solrize.
//!
//! `Document` owns every stage-progress record and its `validation` FK.
//! The hash-change reset ([`Document::apply_hash_change`]) is the single
//! place that enforces "a later stage never observes a mixed old/new
//! state": every downstream column is cleared in one assignment, matching
//! the single-UPDATE requirement in `spec.md` §4.1 and the ordering
//! guarantee in `spec.md` §5.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ContentHash, DocumentId, DownloadErrorCode, PublisherId, StageProgress};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub hash: ContentHash,
    pub url: String,
    pub bds_cache_url: Option<String>,
    pub publisher: PublisherId,
    pub name: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub modified: DateTime<Utc>,

    pub downloaded: Option<DateTime<Utc>>,
    pub download_error: Option<DownloadErrorCode>,

    pub validation_request: Option<DateTime<Utc>>,
    pub validation_api_error: Option<i32>,
    pub file_schema_valid: Option<bool>,
    pub validation: Option<i64>,
    pub regenerate_validation_report: bool,

    pub clean: StageProgress<String>,

    pub flatten: StageProgress<String>,
    pub flattened_activities: Option<serde_json::Value>,

    pub lakify: StageProgress<String>,

    pub solrize: StageProgress<String>,
    pub last_solrize_end: Option<DateTime<Utc>>,
    pub solrize_reindex: bool,
}

impl Document {
    pub fn new_observed(
        id: DocumentId,
        hash: ContentHash,
        url: String,
        bds_cache_url: Option<String>,
        publisher: PublisherId,
        name: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            hash,
            url,
            bds_cache_url,
            publisher,
            name,
            first_seen: now,
            last_seen: now,
            modified: now,
            downloaded: None,
            download_error: None,
            validation_request: None,
            validation_api_error: None,
            file_schema_valid: None,
            validation: None,
            regenerate_validation_report: false,
            clean: StageProgress::not_started(),
            flatten: StageProgress::not_started(),
            flattened_activities: None,
            lakify: StageProgress::not_started(),
            solrize: StageProgress::not_started(),
            last_solrize_end: None,
            solrize_reindex: false,
        }
    }

    /// Stamps `last_seen` without disturbing stage progress: the dataset's
    /// hash is unchanged, so nothing downstream needs to be redone.
    pub fn observe_unchanged(&mut self, url: String, name: String, bds_cache_url: Option<String>, now: DateTime<Utc>) {
        self.url = url;
        self.name = name;
        self.bds_cache_url = bds_cache_url;
        self.last_seen = now;
    }

    /// Applies a BDS-reported hash change: updates identity fields and
    /// clears every downstream stage column in one logical operation,
    /// forcing the document through the whole pipeline again. Per
    /// `spec.md` §4.11, the SI is *not* cleaned here — the caller is
    /// responsible for the object-store half of cleanup before calling
    /// this, and Solrize's delete-before-insert is what keeps the search
    /// index consistent once the document is reprocessed.
    pub fn apply_hash_change(
        &mut self,
        new_hash: ContentHash,
        new_url: String,
        new_name: String,
        bds_cache_url: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.hash = new_hash;
        self.url = new_url;
        self.name = new_name;
        self.bds_cache_url = bds_cache_url;
        self.modified = now;
        self.last_seen = now;

        self.downloaded = None;
        self.download_error = None;
        self.validation_request = None;
        self.validation_api_error = None;
        self.file_schema_valid = None;
        self.validation = None;
        self.regenerate_validation_report = false;
        self.clean = StageProgress::not_started();
        self.flatten = StageProgress::not_started();
        self.flattened_activities = None;
        self.lakify = StageProgress::not_started();
        self.solrize = StageProgress::not_started();
        self.last_solrize_end = None;
        self.solrize_reindex = false;
    }

    pub fn is_stale(&self, pass_start: DateTime<Utc>) -> bool {
        self.last_seen < pass_start
    }

    /// `get_refresh_candidates` predicate (`spec.md` §4.1): documents never
    /// downloaded, excluding the "invalid URL scheme" error (code 3) even
    /// on a retry-errors pass — that error means the BDS-reported URL
    /// itself is unusable, so retrying changes nothing.
    pub fn is_refresh_candidate(&self, retry_errors: bool) -> bool {
        if self.downloaded.is_some() {
            return false;
        }
        match self.download_error {
            None => true,
            Some(DownloadErrorCode(3)) => false,
            Some(_) => retry_errors,
        }
    }

    /// `get_unvalidated` predicate: downloaded without error, has content,
    /// and either never validated or flagged for regeneration.
    pub fn is_unvalidated(&self) -> bool {
        self.downloaded.is_some()
            && self.download_error.is_none()
            && !self.hash.is_empty()
            && (self.validation.is_none() || self.regenerate_validation_report)
    }

    /// `get_valid_to_copy` predicate, given the referenced validation
    /// report's verdict and file type (looked up by the caller — the
    /// predicate here only expresses what's derivable from `Document`
    /// itself, namely that the stage is claimable).
    pub fn is_clean_claimable(&self) -> bool {
        self.clean.is_claimable()
    }

    /// `get_unflattened` predicate: clean finished without error, flatten
    /// not yet done.
    pub fn is_unflattened(&self) -> bool {
        self.clean.is_done() && self.flatten.is_claimable()
    }

    /// `get_unlakified` predicate: flatten finished without error, lakify
    /// not yet done.
    pub fn is_unlakified(&self) -> bool {
        self.flatten.is_done() && self.lakify.is_claimable()
    }

    /// `get_unsolrized` predicate: lakify finished without error, and
    /// either solrize has never run or a reindex was requested.
    pub fn is_unsolrized(&self) -> bool {
        self.lakify.is_done() && (self.solrize.is_claimable() || self.solrize_reindex)
    }

    /// Recovers every stage's orphaned claim after a crash, equivalent to
    /// calling `reset_unfinished_<stage>` for all stages at once.
    pub fn reset_unfinished_claims(&mut self) {
        self.clean.reset_unfinished();
        self.flatten.reset_unfinished();
        self.lakify.reset_unfinished();
        self.solrize.reset_unfinished();
    }

    /// Recovery for a missing object-store blob discovered mid-stage:
    /// rewinds every column from `from_stage` forward (inclusive),
    /// matching the spec's resolved Open Question ("clear all columns
    /// from the earliest invalidated stage forwards").
    pub fn rewind_from(&mut self, from_stage: Stage) {
        match from_stage {
            Stage::Download => {
                self.downloaded = None;
                self.download_error = None;
                self.clean = StageProgress::not_started();
                self.flatten = StageProgress::not_started();
                self.flattened_activities = None;
                self.lakify = StageProgress::not_started();
                self.solrize = StageProgress::not_started();
            }
            Stage::Validate => {
                self.validation_request = None;
                self.clean = StageProgress::not_started();
                self.flatten = StageProgress::not_started();
                self.flattened_activities = None;
                self.lakify = StageProgress::not_started();
                self.solrize = StageProgress::not_started();
            }
            Stage::Clean => {
                self.clean = StageProgress::not_started();
                self.flatten = StageProgress::not_started();
                self.flattened_activities = None;
                self.lakify = StageProgress::not_started();
                self.solrize = StageProgress::not_started();
            }
            Stage::Flatten => {
                self.flatten = StageProgress::not_started();
                self.flattened_activities = None;
                self.lakify = StageProgress::not_started();
                self.solrize = StageProgress::not_started();
            }
            Stage::Lakify => {
                self.lakify = StageProgress::not_started();
                self.solrize = StageProgress::not_started();
            }
            Stage::Solrize => {
                self.solrize = StageProgress::not_started();
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Download,
    Validate,
    Clean,
    Flatten,
    Lakify,
    Solrize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::new_observed(
            DocumentId::new("d1"),
            ContentHash::new("H1"),
            "https://example.org/d1.xml".into(),
            Some("https://bds.example/d1.xml".into()),
            PublisherId::new("p1"),
            "name".into(),
            Utc::now(),
        )
    }

    #[test]
    fn hash_change_resets_every_downstream_column() {
        let mut d = doc();
        let now = Utc::now();
        d.downloaded = Some(now);
        d.file_schema_valid = Some(true);
        d.validation = Some(42);
        d.clean.claim(now);
        d.clean.complete(now);
        d.flatten.claim(now);
        d.flatten.complete(now);
        d.flattened_activities = Some(serde_json::json!([{"a": 1}]));
        d.lakify.claim(now);
        d.lakify.complete(now);
        d.solrize.claim(now);
        d.solrize.complete(now);
        d.last_solrize_end = Some(now);

        d.apply_hash_change(ContentHash::new("H2"), d.url.clone(), d.name.clone(), d.bds_cache_url.clone(), now);

        assert_eq!(d.hash, ContentHash::new("H2"));
        assert!(d.downloaded.is_none());
        assert!(d.file_schema_valid.is_none());
        assert!(d.validation.is_none());
        assert!(d.clean.is_claimable());
        assert!(d.flatten.is_claimable());
        assert!(d.flattened_activities.is_none());
        assert!(d.lakify.is_claimable());
        assert!(d.solrize.is_claimable());
        assert!(d.last_solrize_end.is_none());
    }

    #[test]
    fn refresh_candidate_excludes_downloaded_and_always_excludes_url_scheme_errors() {
        let mut d = doc();
        assert!(d.is_refresh_candidate(false));

        d.download_error = Some(DownloadErrorCode::INVALID_URL_SCHEME);
        assert!(!d.is_refresh_candidate(false));
        assert!(!d.is_refresh_candidate(true));

        d.download_error = Some(DownloadErrorCode(0));
        assert!(!d.is_refresh_candidate(false));
        assert!(d.is_refresh_candidate(true));

        d.downloaded = Some(Utc::now());
        assert!(!d.is_refresh_candidate(true));
    }

    #[test]
    fn stage_predicates_chain_from_clean_through_solrize() {
        let mut d = doc();
        let now = Utc::now();
        assert!(!d.is_unflattened());

        d.clean.claim(now);
        d.clean.complete(now);
        assert!(d.is_unflattened());

        d.flatten.claim(now);
        d.flatten.complete(now);
        assert!(!d.is_unflattened());
        assert!(d.is_unlakified());

        d.lakify.claim(now);
        d.lakify.complete(now);
        assert!(d.is_unsolrized());

        d.solrize.claim(now);
        d.solrize.complete(now);
        assert!(!d.is_unsolrized());

        d.solrize_reindex = true;
        assert!(d.is_unsolrized());
    }

    #[test]
    fn lakify_miss_rewinds_clean_and_lakify_not_just_lakify() {
        let mut d = doc();
        let now = Utc::now();
        d.clean.claim(now);
        d.clean.complete(now);
        d.flatten.claim(now);
        d.flatten.complete(now);
        d.lakify.claim(now);
        d.lakify.complete(now);

        d.rewind_from(Stage::Clean);

        assert!(d.clean.is_claimable());
        assert!(d.flatten.is_claimable());
        assert!(d.lakify.is_claimable());
    }
}
