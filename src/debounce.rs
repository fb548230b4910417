use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

/// Per-event debounce clock
///
/// Each logical event `K` has its own last-firing time; repeats of the same
/// event are ignored until `interval` has elapsed since it last fired. Events
/// never fired before are always ready.
#[derive(Debug, Clone)]
pub struct Debouncer<K> {
    interval: Duration,
    last_fired: HashMap<K, Instant>,
}

impl<K: Eq + Hash> Debouncer<K> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: HashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn ready(&self, key: &K) -> bool {
        self.remaining(key).is_zero()
    }

    /// Time left before `key` may fire again
    pub fn remaining(&self, key: &K) -> Duration {
        match self.last_fired.get(key) {
            Some(last) => self.interval.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    pub fn record(&mut self, key: K) {
        self.record_at(key, Instant::now());
    }

    /// Record a firing that happened at `at`, e.g. when a send started
    pub fn record_at(&mut self, key: K, at: Instant) {
        self.last_fired.insert(key, at);
    }

    /// Record and return true if `key` is ready
    pub fn try_fire(&mut self, key: K) -> bool {
        if self.ready(&key) {
            self.record(key);
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self, key: &K) {
        self.last_fired.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_repeats_inside_interval_are_ignored() {
        let mut debouncer = Debouncer::new(Duration::from_millis(30_000));
        let mut fired_at = Vec::new();
        let start = Instant::now();

        for at_ms in [0u64, 10_000, 31_000] {
            let target = start + Duration::from_millis(at_ms);
            advance(target - Instant::now()).await;
            if debouncer.try_fire("sensor") {
                fired_at.push(at_ms);
            }
        }

        assert_eq!(fired_at, vec![0, 31_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_debounce_independently() {
        let mut debouncer = Debouncer::new(Duration::from_secs(4));

        assert!(debouncer.try_fire('A'));
        assert!(debouncer.try_fire('B'));
        assert!(!debouncer.try_fire('A'));

        advance(Duration::from_secs(1)).await;
        assert_eq!(debouncer.remaining(&'A'), Duration::from_secs(3));

        advance(Duration::from_secs(3)).await;
        assert!(debouncer.ready(&'A'));

        debouncer.reset(&'B');
        assert!(debouncer.ready(&'B'));
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_at_counts_from_given_instant() {
        let mut debouncer = Debouncer::new(Duration::from_secs(30));
        let sent_at = Instant::now();

        advance(Duration::from_secs(4)).await;
        debouncer.record_at((), sent_at);
        assert_eq!(debouncer.remaining(&()), Duration::from_secs(26));

        advance(Duration::from_secs(26)).await;
        assert!(debouncer.ready(&()));
    }
}
