// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The external Validation Service port (`spec.md` §4.4): schema validation
//! against the uploaded XML. A separate, cheaper method exists for the
//! schema-only check the Safety Controller uses to decide black-flagging
//! without paying for a full `?meta=true` report.

use async_trait::async_trait;

use crate::error::PipelineResult;

/// The outcome of calling the validation service for one document.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// The service responded; `report` is the full JSON body (schema result
    /// plus, when requested, the per-activity `?meta=true` index). `valid`
    /// is `None` when the body carries neither `{valid:true}` nor
    /// `{valid:false}` (`spec.md` §8): no verdict is recorded and the next
    /// pass retries.
    Completed { valid: Option<bool>, report: serde_json::Value },
    /// The service rejected the request outright (4xx): persisted as
    /// `validation_api_error`, never retried automatically.
    ClientError { status: u16 },
}

#[async_trait]
pub trait ValidationServiceClient: Send + Sync {
    /// Full validation run against the document's raw XML bytes, requesting
    /// the per-activity meta index.
    async fn validate(&self, xml: &[u8]) -> PipelineResult<ValidationOutcome>;

    /// Schema-only check, cheaper than [`Self::validate`], used by the
    /// Safety Controller to count recent schema failures without needing
    /// the full activity-level report.
    async fn check_schema(&self, xml: &[u8]) -> PipelineResult<ValidationOutcome>;
}
