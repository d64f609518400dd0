// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Command-line surface (`spec.md` §6 "CLI surface"): one subcommand per
//! pipeline stage, plus a `-loop` variant of each that repeats forever with
//! `SERVICE_LOOP_SLEEP` between passes.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "iati-pipeline", version, about = "IATI XML ingestion pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Reconcile the publisher/document catalogue against the Bulk Data Service.
    Refresh,
    /// Run `refresh` forever with `SERVICE_LOOP_SLEEP` between passes.
    RefreshLoop,
    /// Like `refresh`, but also downloads every refresh candidate.
    Reload {
        /// Also retry documents that previously failed to download.
        #[arg(long)]
        retry_errors: bool,
    },
    /// Evaluate publisher black-flag candidates (spec.md §4.6).
    SafetyCheck,
    /// Validate all unvalidated documents against the schema/full validators.
    Validate,
    /// Run `validate` forever with `SERVICE_LOOP_SLEEP` between passes.
    ValidateLoop,
    /// Copy fully-valid `iati-activities` documents straight to the clean container.
    CopyValid,
    /// Attempt a partial clean of invalid-but-salvageable documents.
    CleanInvalid,
    /// Run `copy-valid` followed by `clean-invalid` forever.
    CleanLoop,
    /// Flatten clean documents into per-activity field records.
    Flatten,
    /// Run `flatten` forever with `SERVICE_LOOP_SLEEP` between passes.
    FlattenLoop,
    /// Explode flattened documents into per-activity lake records.
    Lakify,
    /// Run `lakify` forever with `SERVICE_LOOP_SLEEP` between passes.
    LakifyLoop,
    /// Reindex lakified documents into the search index.
    Solrize,
    /// Run `solrize` forever with `SERVICE_LOOP_SLEEP` between passes.
    SolrizeLoop,
}
