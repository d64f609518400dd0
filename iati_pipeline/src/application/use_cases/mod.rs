// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

mod clean;
mod download;
mod flatten_stage;
mod lakify_stage;
mod refresh;
mod safety_controller;
mod solrize;
mod validate;

pub use clean::CleanUseCase;
pub use download::DownloadUseCase;
pub use flatten_stage::FlattenUseCase;
pub use lakify_stage::LakifyUseCase;
pub use refresh::{RefreshOutcome, RefreshUseCase};
pub use safety_controller::SafetyControllerUseCase;
pub use solrize::SolrizeUseCase;
pub use validate::ValidateUseCase;
