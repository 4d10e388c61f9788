//! Background purge of expired rate limit windows.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::limiter::RateLimiter;

/// Spawns the periodic sweep task.
pub struct Sweeper;

impl Sweeper {
    /// Start sweeping `limiter` every `interval` on the current tokio runtime.
    ///
    /// The first sweep happens one full interval after spawning. The task
    /// stops when the returned handle is shut down or dropped.
    pub fn spawn(limiter: Arc<RateLimiter>, interval: Duration) -> SweeperHandle {
        let interval = interval.max(Duration::from_millis(1));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        info!(interval_ms = interval.as_millis() as u64, "Starting rate limit sweeper");

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.sweep();
                        if removed > 0 {
                            debug!(
                                removed = removed,
                                remaining = limiter.entry_count(),
                                "Purged expired rate limit windows"
                            );
                        }
                    }
                    // Fires on an explicit stop and when the handle is dropped
                    _ = shutdown_rx.changed() => break,
                }
            }

            debug!("Rate limit sweeper stopped");
        });

        SweeperHandle {
            shutdown_tx,
            task: Some(task),
        }
    }
}

/// Owner of a running sweep task.
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweep task and wait for it to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::ManualClock;

    #[tokio::test]
    async fn test_sweeper_purges_expired_windows() {
        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(RateLimiter::with_clock(clock.clone()));

        limiter.check_with("stale", 10, Duration::from_millis(10));
        limiter.check_with("live", 10, Duration::from_secs(3600));
        clock.advance(Duration::from_millis(10));

        let handle = Sweeper::spawn(limiter.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(limiter.window("stale").is_none());
        assert!(limiter.window("live").is_some());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_first_sweep_waits_one_interval() {
        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(RateLimiter::with_clock(clock.clone()));

        limiter.check_with("stale", 10, Duration::from_millis(1));
        clock.advance(Duration::from_millis(1));

        let handle = Sweeper::spawn(limiter.clone(), Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(limiter.entry_count(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let limiter = Arc::new(RateLimiter::new());
        let handle = Sweeper::spawn(limiter, Duration::from_millis(10));
        assert!(!handle.is_finished());

        tokio_test::assert_ok!(
            tokio::time::timeout(Duration::from_secs(1), handle.shutdown()).await
        );
    }

    #[tokio::test]
    async fn test_drop_stops_task() {
        let limiter = Arc::new(RateLimiter::new());
        let handle = Sweeper::spawn(limiter.clone(), Duration::from_millis(10));
        drop(handle);

        // The task held the only other reference to the limiter
        for _ in 0..50 {
            if Arc::strong_count(&limiter) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(Arc::strong_count(&limiter), 1);
    }
}
