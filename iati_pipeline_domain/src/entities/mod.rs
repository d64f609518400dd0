// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

pub mod document;
pub mod publisher;
pub mod validation_report;

pub use document::{Document, Stage};
pub use publisher::Publisher;
pub use validation_report::{ActivityValidity, ValidationReport};
