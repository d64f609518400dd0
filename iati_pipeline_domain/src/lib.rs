// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Domain layer: entities, value objects, and port traits for the IATI
//! ingestion pipeline, free of any I/O, framework, or transport dependency.
//!
//! Downstream crates depend on the traits in [`repositories`] and
//! [`services`] to keep stage logic testable against fakes; the concrete
//! `sqlx`/`object_store`/`reqwest`/`quick-xml` adapters live in
//! `iati_pipeline::infrastructure`.

pub mod entities;
pub mod error;
pub mod repositories;
pub mod services;
pub mod value_objects;

pub use error::{PipelineError, PipelineResult};
