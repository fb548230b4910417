//! Liveness supervision.
//!
//! Every blocking wait in the node feeds the supervisor. The underlying reset
//! timer decides what happens when feeding stops for longer than its timeout;
//! on the host build that is a [`SoftwareWatchdog`] which cancels the node and
//! makes the process exit non-zero so the service manager restarts it.

use crate::config::WatchdogConfig;
use crate::error::{MeshError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A reset timer that restarts the device when it is not fed in time
pub trait ResetTimer: Send + Sync {
    fn feed(&self);
    fn timeout(&self) -> Duration;
}

/// Owned handle threaded through every wait loop
pub struct WatchdogSupervisor {
    timer: Arc<dyn ResetTimer>,
    feeds: u64,
    last_feed: Instant,
}

impl WatchdogSupervisor {
    pub fn new(timer: Arc<dyn ResetTimer>) -> Self {
        Self {
            timer,
            feeds: 0,
            last_feed: Instant::now(),
        }
    }

    /// Supervisor backed by a timer that never fires
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopTimer))
    }

    pub fn feed(&mut self) {
        self.timer.feed();
        self.feeds += 1;
        self.last_feed = Instant::now();
    }

    pub fn feed_count(&self) -> u64 {
        self.feeds
    }

    pub fn since_last_feed(&self) -> Duration {
        self.last_feed.elapsed()
    }

    pub fn timeout(&self) -> Duration {
        self.timer.timeout()
    }
}

struct NoopTimer;

impl ResetTimer for NoopTimer {
    fn feed(&self) {}

    fn timeout(&self) -> Duration {
        Duration::MAX
    }
}

/// Software reset timer monitored by a background task
///
/// On expiry the `reset` token is cancelled and [`SoftwareWatchdog::expired`]
/// turns true.
#[derive(Clone)]
pub struct SoftwareWatchdog {
    last_feed: Arc<Mutex<Instant>>,
    timeout: Duration,
    expired: Arc<AtomicBool>,
}

impl SoftwareWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_feed: Arc::new(Mutex::new(Instant::now())),
            timeout,
            expired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create and arm the watchdog from configuration
    pub fn start_from_config(
        config: &WatchdogConfig,
        reset: CancellationToken,
    ) -> Result<Self> {
        if config.timeout_ms == 0 {
            return Err(MeshError::fatal_init(
                "watchdog",
                "timeout must be greater than zero",
            ));
        }
        let watchdog = Self::new(config.timeout());
        watchdog.start(reset);
        Ok(watchdog)
    }

    /// Spawn the monitor task. It stops when `reset` is cancelled.
    pub fn start(&self, reset: CancellationToken) {
        let last_feed = Arc::clone(&self.last_feed);
        let expired = Arc::clone(&self.expired);
        let timeout = self.timeout;
        let check_period = (timeout / 4).max(Duration::from_millis(10));

        *self.last_feed.lock() = Instant::now();
        info!("Watchdog armed with {:?} timeout", timeout);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(check_period);
            loop {
                tokio::select! {
                    _ = reset.cancelled() => {
                        debug!("Watchdog monitor stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let starved_for = last_feed.lock().elapsed();
                        if starved_for > timeout {
                            error!(
                                "Watchdog starved for {:?} (timeout {:?}), resetting node",
                                starved_for, timeout
                            );
                            expired.store(true, Ordering::SeqCst);
                            reset.cancel();
                            break;
                        }
                    }
                }
            }
        });
    }

    pub fn expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }
}

impl ResetTimer for SoftwareWatchdog {
    fn feed(&self) {
        *self.last_feed.lock() = Instant::now();
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Reset timer that only counts feeds, for tests
#[derive(Clone, Default)]
pub struct CountingWatchdog {
    feeds: Arc<AtomicUsize>,
}

impl CountingWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feeds(&self) -> usize {
        self.feeds.load(Ordering::SeqCst)
    }
}

impl ResetTimer for CountingWatchdog {
    fn feed(&self) {
        self.feeds.fetch_add(1, Ordering::SeqCst);
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(120)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn test_fed_watchdog_does_not_expire() {
        let reset = CancellationToken::new();
        let watchdog = SoftwareWatchdog::new(Duration::from_secs(1));
        watchdog.start(reset.clone());

        for _ in 0..10 {
            sleep(Duration::from_millis(500)).await;
            watchdog.feed();
        }

        assert!(!watchdog.expired());
        assert!(!reset.is_cancelled());
        reset.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_starved_watchdog_cancels_node() {
        let reset = CancellationToken::new();
        let watchdog = SoftwareWatchdog::new(Duration::from_secs(1));
        watchdog.start(reset.clone());

        sleep(Duration::from_secs(3)).await;

        assert!(watchdog.expired());
        assert!(reset.is_cancelled());
    }

    #[test]
    fn test_zero_timeout_is_fatal() {
        let config = WatchdogConfig {
            enabled: true,
            timeout_ms: 0,
        };
        let result = SoftwareWatchdog::start_from_config(&config, CancellationToken::new());
        assert!(matches!(result, Err(MeshError::FatalInit { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervisor_counts_feeds() {
        let counter = CountingWatchdog::new();
        let mut supervisor = WatchdogSupervisor::new(Arc::new(counter.clone()));

        sleep(Duration::from_secs(5)).await;
        assert_eq!(supervisor.since_last_feed(), Duration::from_secs(5));

        supervisor.feed();
        supervisor.feed();
        assert_eq!(supervisor.feed_count(), 2);
        assert_eq!(counter.feeds(), 2);
        assert_eq!(supervisor.since_last_feed(), Duration::ZERO);
    }
}
