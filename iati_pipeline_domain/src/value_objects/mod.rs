// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Value objects shared across entities and ports.

pub mod content_hash;
pub mod document_id;
pub mod explode_element;
pub mod flattened_activity;
pub mod publisher_id;
pub mod stage_progress;

pub use content_hash::ContentHash;
pub use document_id::DocumentId;
pub use explode_element::ExplodeElement;
pub use flattened_activity::{normalize_identifier, FlattenedField, FlattenedRecord};
pub use publisher_id::PublisherId;
pub use stage_progress::{DownloadErrorCode, StageProgress};
