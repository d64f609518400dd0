// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The `(<stage>_start, <stage>_end, <stage>_error)` triple shared by every
//! stage column on `Document`.
//!
//! Claiming a document is setting `start = now()` with `error` cleared;
//! completing it sets `end`; failing it sets `error` without `end`. At most
//! one of these three states holds at a time per the state-store invariant:
//! "at most one stage in progress". `reset_unfinished` is the crash-recovery
//! operation run at the start of every orchestrator pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StageProgress<E> {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub error: Option<E>,
}

impl<E: Clone> StageProgress<E> {
    pub fn not_started() -> Self {
        Self { start: None, end: None, error: None }
    }

    pub fn is_in_progress(&self) -> bool {
        self.start.is_some() && self.end.is_none() && self.error.is_none()
    }

    pub fn is_done(&self) -> bool {
        self.end.is_some() && self.error.is_none()
    }

    pub fn is_errored(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_claimable(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn claim(&mut self, now: DateTime<Utc>) {
        self.start = Some(now);
        self.end = None;
        self.error = None;
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.end = Some(now);
        self.error = None;
    }

    pub fn fail(&mut self, error: E) {
        self.error = Some(error);
    }

    pub fn reset(&mut self) {
        self.start = None;
        self.end = None;
        self.error = None;
    }

    /// Recovers a claim left behind by a crashed worker: clears `start` if
    /// the stage never reached `end` or `error`. A no-op otherwise.
    pub fn reset_unfinished(&mut self) {
        if self.start.is_some() && self.end.is_none() && self.error.is_none() {
            self.start = None;
        }
    }
}

/// Numeric download error codes, matching the upstream HTTP/transport
/// taxonomy: 0 connection refused, 1 TLS error, 2 undetectable charset,
/// 3 invalid URL scheme, 4 no `bds_cache_url`, otherwise the literal HTTP
/// status code BDS or the publisher origin returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadErrorCode(pub i32);

impl DownloadErrorCode {
    pub const CONNECTION_REFUSED: Self = Self(0);
    pub const TLS_ERROR: Self = Self(1);
    pub const UNDETECTABLE_CHARSET: Self = Self(2);
    pub const INVALID_URL_SCHEME: Self = Self(3);
    pub const NO_CACHE_URL: Self = Self(4);
    pub const NOT_FOUND: Self = Self(404);

    pub fn from_http_status(status: u16) -> Self {
        Self(status as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_then_complete_transitions_cleanly() {
        let mut p: StageProgress<i32> = StageProgress::not_started();
        assert!(p.is_claimable());

        let t0 = Utc::now();
        p.claim(t0);
        assert!(p.is_in_progress());
        assert!(!p.is_claimable());

        p.complete(t0);
        assert!(p.is_done());
        assert!(!p.is_in_progress());
    }

    #[test]
    fn crash_recovery_clears_orphaned_claim_only() {
        let mut in_progress: StageProgress<i32> = StageProgress::not_started();
        in_progress.claim(Utc::now());
        in_progress.reset_unfinished();
        assert!(in_progress.is_claimable());

        let mut done: StageProgress<i32> = StageProgress::not_started();
        let t0 = Utc::now();
        done.claim(t0);
        done.complete(t0);
        done.reset_unfinished();
        assert!(done.is_done(), "completed stages must not be reset");
    }

    #[test]
    fn fail_without_end_is_not_in_progress() {
        let mut p: StageProgress<i32> = StageProgress::not_started();
        p.claim(Utc::now());
        p.fail(404);
        assert!(!p.is_in_progress());
        assert!(p.is_errored());
    }
}
