// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Safety Controller (`spec.md` §4.6): recomputes publisher black flags
//! from recent schema-failure counts and notifies newly flagged publishers.
//!
//! The original system drains an external `publisher-black-flag-remove`
//! message queue before recomputing flags; this pipeline has no message
//! broker in its ambient stack, so flag removal is exposed as a direct
//! `clear_black_flag` entry point the `safety-check` CLI subcommand can
//! invoke per publisher id instead.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use iati_pipeline_domain::error::PipelineResult;
use iati_pipeline_domain::repositories::StateStoreRepository;
use iati_pipeline_domain::value_objects::PublisherId;

use crate::infrastructure::config::ValidateTunables;

pub struct SafetyControllerUseCase {
    state_store: Arc<dyn StateStoreRepository>,
    notification_url: Option<String>,
    http: reqwest::Client,
    tunables: ValidateTunables,
}

impl SafetyControllerUseCase {
    pub fn new(state_store: Arc<dyn StateStoreRepository>, notification_url: Option<String>, tunables: ValidateTunables) -> Self {
        Self { state_store, notification_url, http: reqwest::Client::new(), tunables }
    }

    pub async fn clear_flag(&self, publisher_id: &PublisherId) -> PipelineResult<()> {
        self.state_store.clear_black_flag(publisher_id).await
    }

    /// Recomputes flags, then notifies every newly flagged publisher that
    /// has not yet been notified.
    pub async fn run(&self) -> PipelineResult<usize> {
        let since = Utc::now() - chrono::Duration::hours(self.tunables.safety_check_period_hours as i64);
        let candidates = self.state_store.get_black_flag_candidates(self.tunables.safety_check_threshold as i64, since).await?;
        let now = Utc::now();
        for publisher_id in &candidates {
            if let Err(e) = self.state_store.set_black_flag(publisher_id, now).await {
                warn!(publisher = %publisher_id, error = %e, "failed to set black flag");
            } else {
                info!(publisher = %publisher_id, "black flag raised");
            }
        }

        let needing_notification = self.state_store.get_publishers_needing_black_flag_notification().await?;
        let mut notified = 0usize;
        for publisher in &needing_notification {
            if self.notify(publisher.org_id.as_str()).await {
                if let Err(e) = self.state_store.mark_black_flag_notified(&publisher.org_id).await {
                    warn!(publisher = %publisher.org_id, error = %e, "failed to record black flag notification");
                } else {
                    notified += 1;
                }
            }
        }
        Ok(notified)
    }

    async fn notify(&self, org_id: &str) -> bool {
        let Some(url) = self.notification_url.as_deref() else { return true };
        match self.http.post(url).json(&serde_json::json!({ "org_id": org_id })).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(org_id, status = %response.status(), "black flag notification rejected");
                false
            }
            Err(e) => {
                warn!(org_id, error = %e, "black flag notification failed");
                false
            }
        }
    }
}
