//! Periodic tasks
//!
//! Each tick runs in its own task, so a panic inside a tick is logged and the
//! timer keeps going.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Run `tick` every `period` until cancelled
///
/// The first tick fires one period after the call. Ticks that fall due
/// while the previous one is still running are skipped.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => supervise(name, tick()).await,
            }
        }
        debug!(task = name, "periodic task stopped");
    })
}

/// Run a future in its own task and log if it panics
pub async fn supervise<Fut>(name: &'static str, fut: Fut)
where
    Fut: Future<Output = ()> + Send + 'static,
{
    if let Err(e) = tokio::spawn(fut).await {
        if e.is_panic() {
            error!(task = name, error = %e, "task panicked");
        } else {
            warn!(task = name, error = %e, "task cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_ticks_every_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let handle = spawn_periodic("count", Duration::from_secs(1), cancel.clone(), {
            let count = Arc::clone(&count);
            move || {
                let count = Arc::clone(&count);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_tick_does_not_stop_timer() {
        let count = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let handle = spawn_periodic("flaky", Duration::from_secs(1), cancel.clone(), {
            let count = Arc::clone(&count);
            move || {
                let count = Arc::clone(&count);
                async move {
                    if count.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("first tick fails");
                    }
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_stops_before_first_tick() {
        let count = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let handle = spawn_periodic("idle", Duration::from_secs(3600), cancel.clone(), {
            let count = Arc::clone(&count);
            move || {
                let count = Arc::clone(&count);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
