//! Periodic scheduler
//!
//! Fires the accounting pipeline at the top of every hour. Implemented as a
//! sleep-until-next-hour loop; the run is awaited inline, so two ticks can
//! never overlap, and shutdown is only observed between runs, which lets an
//! in-flight run complete.

use crate::accounting::AccountingPipeline;
use chrono::{DateTime, Local, Timelike};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// Time remaining until the next top of the hour
pub fn delay_until_next_hour(now: DateTime<Local>) -> Duration {
    let next = (now + chrono::Duration::hours(1))
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0));
    match next {
        Some(next) => (next - now).to_std().unwrap_or(Duration::from_secs(3600)),
        // Unrepresentable local time (DST shuffle); fall back to a plain hour.
        None => Duration::from_secs(3600),
    }
}

/// Generic serialized tick loop: sleep, run, repeat.
///
/// `next_delay` is re-evaluated after every run, so long runs do not cause
/// catch-up bursts. The task future is awaited before the next delay starts.
pub async fn run_loop<D, F, Fut>(
    mut next_delay: D,
    mut shutdown: broadcast::Receiver<bool>,
    mut task: F,
) where
    D: FnMut() -> Duration,
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        let delay = next_delay();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                task().await;
            }
            _ = shutdown.recv() => {
                debug!("Scheduler shutting down");
                break;
            }
        }
    }
}

/// Drive the accounting pipeline hourly until shutdown
pub async fn run_hourly(pipeline: Arc<AccountingPipeline>, shutdown: broadcast::Receiver<bool>) {
    run_loop(
        || delay_until_next_hour(Local::now()),
        shutdown,
        move || {
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.run().await }
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delay_mid_hour() {
        let now = Local.with_ymd_and_hms(2026, 1, 1, 10, 30, 0).unwrap();
        assert_eq!(delay_until_next_hour(now), Duration::from_secs(1800));
    }

    #[test]
    fn test_delay_at_top_of_hour_is_full_hour() {
        let now = Local.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(delay_until_next_hour(now), Duration::from_secs(3600));
    }

    #[test]
    fn test_delay_just_before_hour() {
        let now = Local.with_ymd_and_hms(2026, 1, 1, 10, 59, 59).unwrap();
        assert_eq!(delay_until_next_hour(now), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_slow_runs_never_overlap() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));

        let loop_handle = {
            let active = Arc::clone(&active);
            let max_active = Arc::clone(&max_active);
            let runs = Arc::clone(&runs);
            tokio::spawn(run_loop(
                || Duration::from_millis(10),
                shutdown_rx,
                move || {
                    let active = Arc::clone(&active);
                    let max_active = Arc::clone(&max_active);
                    let runs = Arc::clone(&runs);
                    async move {
                        let now_active = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_active.fetch_max(now_active, Ordering::SeqCst);
                        // Far slower than the tick interval.
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        runs.fetch_add(1, Ordering::SeqCst);
                    }
                },
            ))
        };

        tokio::time::sleep(Duration::from_millis(250)).await;
        shutdown_tx.send(true).unwrap();
        loop_handle.await.unwrap();

        assert!(runs.load(Ordering::SeqCst) >= 2);
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_in_flight_run_completes_on_shutdown() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let completed = Arc::new(AtomicUsize::new(0));

        let loop_handle = {
            let completed = Arc::clone(&completed);
            tokio::spawn(run_loop(
                || Duration::from_millis(5),
                shutdown_rx,
                move || {
                    let completed = Arc::clone(&completed);
                    async move {
                        tokio::time::sleep(Duration::from_millis(80)).await;
                        completed.fetch_add(1, Ordering::SeqCst);
                    }
                },
            ))
        };

        // Shut down while the first run is in flight.
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown_tx.send(true).unwrap();
        loop_handle.await.unwrap();

        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_first_tick() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let runs = Arc::new(AtomicUsize::new(0));

        let loop_handle = {
            let runs = Arc::clone(&runs);
            tokio::spawn(run_loop(
                || Duration::from_secs(3600),
                shutdown_rx,
                move || {
                    let runs = Arc::clone(&runs);
                    async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                    }
                },
            ))
        };

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), loop_handle)
            .await
            .expect("loop should exit promptly")
            .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
