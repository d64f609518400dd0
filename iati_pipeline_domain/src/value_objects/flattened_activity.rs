// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The shape Flatten produces and Solrize consumes: one record per
//! `<iati-activity>`, mapping canonical snake_case names to scalars, lists
//! of scalars (on repeated occurrence), or — under an `"@<element>"` key —
//! a list of explode-element sub-records.
//!
//! This module only defines the shape and the normalization shared with
//! Lakify ([`normalize_identifier`], invariant 7 in `spec.md` §8). The
//! transformation itself lives in the infrastructure layer's
//! `flatten`/`lakify` modules, per the out-of-scope contract in `spec.md`
//! §1.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlattenedField {
    Scalar(String),
    List(Vec<String>),
    SubRecords(Vec<FlattenedRecord>),
}

impl FlattenedField {
    /// Accumulates a second occurrence of the same canonical name: first
    /// occurrence stores the scalar, subsequent occurrences promote to a
    /// list, per the Flatten contract.
    pub fn accumulate(existing: Option<FlattenedField>, value: String) -> FlattenedField {
        match existing {
            None => FlattenedField::Scalar(value),
            Some(FlattenedField::Scalar(first)) => FlattenedField::List(vec![first, value]),
            Some(FlattenedField::List(mut values)) => {
                values.push(value);
                FlattenedField::List(values)
            }
            Some(FlattenedField::SubRecords(_)) => {
                // Explode-element sub-lists never accumulate scalars; a
                // caller mixing the two kinds under the same key is a bug
                // in the transformation, not recoverable data.
                existing.unwrap()
            }
        }
    }
}

pub type FlattenedRecord = BTreeMap<String, FlattenedField>;

/// Strips newlines and surrounding whitespace from an `iati_identifier`
/// value, matching what Lakify hashes and what Flatten stores — the two
/// must agree byte-for-byte or Solrize's per-activity blob lookup
/// (`<document_id>/<sha1(identifier)>`) would miss.
pub fn normalize_identifier(raw: &str) -> String {
    raw.chars().filter(|c| *c != '\n' && *c != '\r').collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_name_promotes_to_list() {
        let first = FlattenedField::accumulate(None, "a".into());
        assert_eq!(first, FlattenedField::Scalar("a".into()));

        let second = FlattenedField::accumulate(Some(first), "b".into());
        assert_eq!(second, FlattenedField::List(vec!["a".into(), "b".into()]));

        let third = FlattenedField::accumulate(Some(second), "c".into());
        assert_eq!(third, FlattenedField::List(vec!["a".into(), "b".into(), "c".into()]));
    }

    #[test]
    fn identifier_normalization_strips_newlines_and_surrounding_whitespace() {
        assert_eq!(normalize_identifier("  GB-1\n-2345\n  "), "GB-1-2345");
        assert_eq!(normalize_identifier("GB-1-2345"), "GB-1-2345");
    }
}
