// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap Module
//!
//! Sits outside the domain/application/infrastructure layers and owns
//! everything `main` needs before the first orchestrator pass runs:
//!
//! - **CLI parsing** (`cli`) — the fourteen-subcommand surface from
//!   `spec.md` §6.
//! - **Signal handling** (`signals`) — SIGTERM/SIGINT wired into a
//!   [`shutdown::ShutdownCoordinator`].
//! - **Shutdown coordination** (`shutdown`) — cancellation token shared by
//!   every `*-loop` subcommand.
//! - **Exit codes** (`exit_code`) — `PipelineError` to Unix exit status.

pub mod cli;
pub mod exit_code;
pub mod shutdown;
pub mod signals;

pub use cli::{Cli, Command};
pub use exit_code::{map_error_to_exit_code, result_to_exit_code};
pub use shutdown::{CancellationToken, ShutdownCoordinator};

use clap::Parser;

/// Parses `std::env::args`. Clap handles `--help`/`--version` and exits the
/// process itself on those paths.
pub fn parse_cli() -> Cli {
    Cli::parse()
}
