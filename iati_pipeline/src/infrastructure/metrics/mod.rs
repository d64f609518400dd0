// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Prometheus metrics: the stage queue-depth gauges named in `spec.md` §7
//! plus per-stage `in_progress`/`error` counters, exported over a minimal
//! HTTP endpoint.

mod endpoint;
mod service;

pub use endpoint::MetricsEndpoint;
pub use service::{MetricsService, Stage};
