// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The organisation owning one or more [`crate::entities::document::Document`]s.
//!
//! Lifecycle: created on first observation during Refresh, `last_seen`
//! stamped every pass the publisher is still reported by the Bulk Data
//! Service, hard-deleted (cascading to its documents) once
//! `last_seen < pass_start`. The black-flag fields are owned by the Safety
//! Controller (`spec.md` §4.6), not by Refresh.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::PublisherId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publisher {
    pub org_id: PublisherId,
    pub short_name: String,
    pub title: String,
    pub iati_identifier: Option<String>,
    pub dataset_count: i64,
    pub created: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub black_flag: Option<DateTime<Utc>>,
    pub black_flag_notified: bool,
}

impl Publisher {
    pub fn new_observed(
        org_id: PublisherId,
        short_name: String,
        title: String,
        iati_identifier: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            org_id,
            short_name,
            title,
            iati_identifier,
            dataset_count: 0,
            created: now,
            last_seen: now,
            black_flag: None,
            black_flag_notified: false,
        }
    }

    /// Stamps `last_seen` for a publisher observed again in a refresh pass.
    /// Dataset counts and names are refreshed from the latest index; the
    /// black-flag fields are untouched (they belong to the Safety
    /// Controller).
    pub fn observe(&mut self, title: String, iati_identifier: Option<String>, dataset_count: i64, now: DateTime<Utc>) {
        self.title = title;
        self.iati_identifier = iati_identifier;
        self.dataset_count = dataset_count;
        self.last_seen = now;
    }

    /// Whether this publisher disappeared from the catalogue in the pass
    /// that started at `pass_start` and should be removed (cascading to its
    /// documents) once cleanup has run.
    pub fn is_stale(&self, pass_start: DateTime<Utc>) -> bool {
        self.last_seen < pass_start
    }

    pub fn raise_black_flag(&mut self, now: DateTime<Utc>) {
        self.black_flag = Some(now);
        self.black_flag_notified = false;
    }

    pub fn clear_black_flag(&mut self) {
        self.black_flag = None;
        self.black_flag_notified = false;
    }

    pub fn is_black_flagged(&self) -> bool {
        self.black_flag.is_some()
    }

    pub fn needs_black_flag_notification(&self) -> bool {
        self.black_flag.is_some() && !self.black_flag_notified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publisher() -> Publisher {
        Publisher::new_observed(
            PublisherId::new("p1"),
            "short".into(),
            "Title".into(),
            Some("XM-DAC-1".into()),
            Utc::now(),
        )
    }

    #[test]
    fn stale_after_pass_start_not_observed() {
        let p = publisher();
        let future_pass_start = p.last_seen + chrono::Duration::seconds(1);
        assert!(p.is_stale(future_pass_start));
        assert!(!p.is_stale(p.last_seen));
    }

    #[test]
    fn black_flag_notification_gate() {
        let mut p = publisher();
        assert!(!p.needs_black_flag_notification());
        p.raise_black_flag(Utc::now());
        assert!(p.needs_black_flag_notification());
        p.black_flag_notified = true;
        assert!(!p.needs_black_flag_notification());
        p.clear_black_flag();
        assert!(!p.is_black_flagged());
    }
}
