// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Structured logging setup: an `EnvFilter` driven by `RUST_LOG` (falling
//! back to `LOG_LEVEL`, then `info`), with an optional JSON formatter for
//! production deployments (`LOG_FORMAT=json`).

use tracing_subscriber::EnvFilter;

/// Initializes the global `tracing` subscriber. Must be called exactly once,
/// as early as possible in `main`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
