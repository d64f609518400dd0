// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Infrastructure layer: adapters over external collaborators (`adapters`,
//! `repositories`), the in-process transformation services Flatten and
//! Lakify own (`flatten`, `lakify`), and process-wide concerns (`config`,
//! `logging`, `metrics`).

pub mod adapters;
pub mod config;
pub mod flatten;
pub mod lakify;
pub mod logging;
pub mod metrics;
pub mod repositories;
