// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

pub mod flatten_service;
pub mod lakify_service;

pub use flatten_service::FlattenService;
pub use lakify_service::{LakeActivity, LakifyService};
