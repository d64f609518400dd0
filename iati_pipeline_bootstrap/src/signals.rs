// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Installs SIGTERM/SIGINT handlers that drive a [`ShutdownCoordinator`].
//!
//! Spawned once from `main`; every `*-loop` subcommand checks the returned
//! token between passes instead of polling signals itself.

use crate::shutdown::ShutdownCoordinator;

/// Spawns a background task that waits for SIGTERM or SIGINT (Ctrl-C) and
/// calls [`ShutdownCoordinator::initiate_shutdown`] on receipt.
pub fn install(coordinator: ShutdownCoordinator) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received");
        coordinator.initiate_shutdown();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
