// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Domain-wide error taxonomy.
//!
//! Mirrors the categories described for the pipeline: transient upstream
//! failures the next pass will retry, expected-client statuses that still
//! persist a result, semantic skips that are not failures at all, source
//! corruption that rewinds a document to an earlier stage, integrity
//! violations from the state store, and hard stops that abort a whole pass.
//! Stage code matches on these variants; it never inspects a transport
//! library's own error type directly.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// A remote collaborator (BDS, validator, object store, search index)
    /// returned a 5xx, timed out, or refused the connection. The caller
    /// should record a retryable error code and move to the next document.
    #[error("upstream error calling {service}: {message}")]
    Upstream { service: &'static str, message: String },

    /// A remote validator returned a documented 4xx (400/413/422) that the
    /// spec treats as a persisted, non-retryable result.
    #[error("expected client error from {service}: status {status}")]
    ExpectedClient { service: &'static str, status: u16 },

    /// Stored XML/JSON could not be parsed, a blob was missing where one was
    /// required, or a charset could not be determined. The caller must
    /// rewind the document to the earliest stage whose output is no longer
    /// trustworthy.
    #[error("source corrupt: {0}")]
    SourceCorrupt(String),

    /// The state store returned a database error; the transaction has been
    /// rolled back and the worker loop should treat this document as failed
    /// for this pass.
    #[error("state store error: {0}")]
    Database(String),

    /// A whole pass must abort: schema version mismatch, BDS indices from
    /// different runs, or a safety threshold breach.
    #[error("hard stop: {0}")]
    HardStop(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl PipelineError {
    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        PipelineError::Upstream { service, message: message.into() }
    }

    /// Whether the next pass should simply retry (as opposed to requiring
    /// operator intervention).
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Upstream { .. } | PipelineError::Database(_))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::SerializationError(e.to_string())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
