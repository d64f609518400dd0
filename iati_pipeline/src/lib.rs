// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Application and infrastructure layers for the IATI ingestion pipeline.
//! The domain model lives in `iati_pipeline_domain`; process bootstrap
//! (CLI, signals, exit codes) lives in `iati_pipeline_bootstrap`.

pub mod application;
pub mod infrastructure;
