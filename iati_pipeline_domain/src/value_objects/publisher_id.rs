// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Opaque publisher (`org_id`) identifier, BDS-assigned like `DocumentId`.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublisherId(String);

impl PublisherId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublisherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PublisherId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for PublisherId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
