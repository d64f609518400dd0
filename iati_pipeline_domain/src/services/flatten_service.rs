// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The Flatten transformation contract (`spec.md` §4.8): turns one cleaned
//! IATI activities document into an array of flattened activity records.
//!
//! This is a pure, in-memory transformation - no I/O - so it is a trait
//! rather than a repository port, letting the use case depend on the
//! abstraction while `infrastructure::flatten` supplies the `quick-xml`
//! based implementation.

use crate::error::PipelineResult;
use crate::value_objects::FlattenedRecord;

pub trait FlattenService: Send + Sync {
    /// Parses `xml` (the root must be `<iati-activities>`) and returns one
    /// [`FlattenedRecord`] per `<iati-activity>`, in document order.
    ///
    /// Returns [`crate::error::PipelineError::SourceCorrupt`] when the root
    /// tag does not match or the document cannot be parsed as XML.
    fn flatten(&self, xml: &[u8]) -> PipelineResult<Vec<FlattenedRecord>>;
}
