// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Generic scan → dispatch → sleep loop shared by every `*-loop` CLI
//! subcommand (`spec.md` §5 "Concurrency").
//!
//! The original system parallelizes a stage by forking one OS process per
//! index-residue stripe of its candidate list (`list[i::PARALLEL_PROCESSES]`).
//! This pipeline keeps the same striping scheme but replaces the process
//! pool with a bounded `tokio` task pool: each stripe runs sequentially
//! inside its own task, and outcomes are aggregated through `JoinHandle`
//! rather than a shared mutable counter, so no stripe's progress can be
//! lost to a racing write.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use iati_pipeline_bootstrap::CancellationToken;

/// Splits `items` into `parallel_processes` index-residue stripes and runs
/// each stripe's items sequentially inside its own task, all stripes
/// running concurrently. Returns the number of items processed.
pub async fn run_striped<T, F, Fut>(items: Vec<T>, parallel_processes: u32, process: F) -> usize
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let stripe_count = parallel_processes.max(1) as usize;
    let mut stripes: Vec<Vec<T>> = (0..stripe_count).map(|_| Vec::new()).collect();
    for (i, item) in items.into_iter().enumerate() {
        stripes[i % stripe_count].push(item);
    }

    let mut handles = Vec::with_capacity(stripe_count);
    for stripe in stripes {
        let process = process.clone();
        handles.push(tokio::spawn(async move {
            let mut count = 0usize;
            for item in stripe {
                process(item).await;
                count += 1;
            }
            count
        }));
    }

    let mut total = 0usize;
    for handle in handles {
        match handle.await {
            Ok(count) => total += count,
            Err(e) => warn!(error = %e, "a stripe task panicked"),
        }
    }
    total
}

/// Runs `pass` once, then again every `sleep_between` until `shutdown` is
/// cancelled. Checks `shutdown` both before sleeping and during the sleep
/// itself, so a signal received mid-sleep does not wait out the full
/// interval (`spec.md` §5's graceful-shutdown requirement).
pub async fn run_loop<F, Fut>(shutdown: CancellationToken, sleep_between: Duration, pass: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        pass().await;
        if shutdown.is_cancelled() {
            return;
        }
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(sleep_between) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn striping_processes_every_item_exactly_once() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let items: Vec<i32> = (0..10).collect();
        let total = run_striped(items, 3, {
            let seen = seen.clone();
            move |item: i32| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(item);
                }
            }
        })
        .await;
        assert_eq!(total, 10);
        let mut got = seen.lock().unwrap().clone();
        got.sort();
        assert_eq!(got, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn loop_stops_when_shutdown_is_already_cancelled() {
        let coordinator = iati_pipeline_bootstrap::ShutdownCoordinator::new(Duration::from_secs(1));
        let token = coordinator.token();
        let passes = Arc::new(AtomicUsize::new(0));
        coordinator.initiate_shutdown();

        run_loop(token, Duration::from_secs(10), {
            let passes = passes.clone();
            move || {
                let passes = passes.clone();
                async move {
                    passes.fetch_add(1, Ordering::SeqCst);
                }
            }
        })
        .await;

        assert_eq!(passes.load(Ordering::SeqCst), 1);
    }
}
