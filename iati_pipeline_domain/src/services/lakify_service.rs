// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The Lakify transformation contract (`spec.md` §4.9): explodes one cleaned
//! document into per-activity blob payloads keyed by an identifier hash.

use crate::error::PipelineResult;

/// One activity's lake payload: the XML subtree verbatim and its
/// `recursive_json_nest` structured form, both keyed by `id_hash`.
#[derive(Debug, Clone, PartialEq)]
pub struct LakeActivity {
    pub id_hash: String,
    pub xml: Vec<u8>,
    pub json: serde_json::Value,
}

pub trait LakifyService: Send + Sync {
    /// Explodes `xml` (root `<iati-activities>`) into one [`LakeActivity`]
    /// per `<iati-activity>`, freeing each parsed subtree as it moves to
    /// the next so memory use stays bounded by one activity at a time.
    fn explode(&self, xml: &[u8]) -> PipelineResult<Vec<LakeActivity>>;
}
