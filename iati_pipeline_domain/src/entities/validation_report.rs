// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! One row per validation run. `Document.validation` always points at the
//! most recent report for that document; a new run inserts a new row and
//! repoints the FK atomically (`update_validation_state`, `spec.md` §4.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ContentHash, DocumentId, PublisherId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub id: Option<i64>,
    pub document_id: DocumentId,
    pub document_hash: ContentHash,
    pub document_url: String,
    pub publisher: PublisherId,
    pub publisher_name: String,
    pub created: DateTime<Utc>,
    pub valid: bool,
    pub report: serde_json::Value,
}

impl ValidationReport {
    pub fn new(
        document_id: DocumentId,
        document_hash: ContentHash,
        document_url: String,
        publisher: PublisherId,
        publisher_name: String,
        valid: bool,
        report: serde_json::Value,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            document_id,
            document_hash,
            document_url,
            publisher,
            publisher_name,
            created,
            valid,
            report,
        }
    }

    pub fn file_type(&self) -> Option<&str> {
        self.report.get("fileType").and_then(|v| v.as_str())
    }

    pub fn iati_version(&self) -> Option<&str> {
        self.report.get("iatiVersion").and_then(|v| v.as_str())
    }

    /// Whether this file is an IATI activities file that passed validation
    /// outright: the `copy_valid` predicate (`spec.md` §4.7).
    pub fn is_fully_valid_activities_file(&self) -> bool {
        self.valid && self.file_type() == Some("iati-activities")
    }

    /// Per-activity validity index (`?meta=true` reports), keyed by the
    /// activity's position in document order.
    pub fn activity_validity(&self) -> Vec<ActivityValidity> {
        self.report
            .get("iati-activities")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|entry| {
                        let index = entry.get("index")?.as_u64()? as usize;
                        let valid = entry.get("valid")?.as_bool()?;
                        Some(ActivityValidity { index, valid })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `clean_invalid` should attempt a partial clean: the file
    /// itself is invalid, but the per-activity index has at least one
    /// valid entry and the IATI version is 2.x or higher.
    pub fn is_partially_cleanable(&self) -> bool {
        if self.valid {
            return false;
        }
        let has_valid_activity = self.activity_validity().iter().any(|a| a.valid);
        let version_ok = self
            .iati_version()
            .and_then(|v| v.split('.').next())
            .and_then(|major| major.parse::<u32>().ok())
            .map(|major| major >= 2)
            .unwrap_or(false);
        has_valid_activity && version_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityValidity {
    pub index: usize,
    pub valid: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(valid: bool, body: serde_json::Value) -> ValidationReport {
        ValidationReport::new(
            DocumentId::new("d1"),
            ContentHash::new("H1"),
            "https://example.org/d1.xml".into(),
            PublisherId::new("p1"),
            "Publisher".into(),
            valid,
            body,
            Utc::now(),
        )
    }

    #[test]
    fn valid_activities_file_is_copyable() {
        let r = report(true, serde_json::json!({"valid": true, "fileType": "iati-activities"}));
        assert!(r.is_fully_valid_activities_file());
    }

    #[test]
    fn invalid_file_with_valid_activity_and_v2_is_partially_cleanable() {
        let r = report(
            false,
            serde_json::json!({
                "valid": false,
                "iatiVersion": "2.03",
                "iati-activities": [{"index": 0, "valid": true}, {"index": 1, "valid": false}]
            }),
        );
        assert!(r.is_partially_cleanable());
        let kept: Vec<_> = r.activity_validity().into_iter().filter(|a| a.valid).collect();
        assert_eq!(kept, vec![ActivityValidity { index: 0, valid: true }]);
    }

    #[test]
    fn invalid_file_with_no_valid_activities_is_not_cleanable() {
        let r = report(
            false,
            serde_json::json!({
                "valid": false,
                "iatiVersion": "2.03",
                "iati-activities": [{"index": 0, "valid": false}]
            }),
        );
        assert!(!r.is_partially_cleanable());
    }

    #[test]
    fn pre_v2_file_is_not_cleanable_even_with_valid_activities() {
        let r = report(
            false,
            serde_json::json!({
                "valid": false,
                "iatiVersion": "1.05",
                "iati-activities": [{"index": 0, "valid": true}]
            }),
        );
        assert!(!r.is_partially_cleanable());
    }
}
