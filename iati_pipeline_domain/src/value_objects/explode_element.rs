// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! A child element of `<iati-activity>` promoted to its own search
//! collection (e.g. `transaction`, `budget`). The configured set comes from
//! `EXPLODE_ELEMENTS`; this type just gives it a name so Flatten, Lakify and
//! Solrize agree on spelling.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExplodeElement(String);

impl ExplodeElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key under which flattened occurrences of this element are nested
    /// inside a flattened activity record, e.g. `"@transaction"`.
    pub fn sub_list_key(&self) -> String {
        format!("@{}", self.0)
    }

    /// The search collection name this element's occurrences are indexed
    /// into, identical to the element's own name.
    pub fn collection_name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExplodeElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
