use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

/// Minimum interval between attempts, tracked per key so that one busy
/// lesson never delays writes for another.
#[derive(Debug)]
pub struct KeyedThrottle<K> {
    interval: Duration,
    last_attempt: HashMap<K, Instant>,
}

impl<K: Eq + Hash + Copy> KeyedThrottle<K> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_attempt: HashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_throttled(&self, key: &K, now: Instant) -> bool {
        self.last_attempt
            .get(key)
            .map_or(false, |last| now.saturating_duration_since(*last) < self.interval)
    }

    /// Records an attempt for `key` unless one happened within the interval.
    pub fn try_acquire(&mut self, key: K, now: Instant) -> bool {
        if self.is_throttled(&key, now) {
            return false;
        }
        self.last_attempt.insert(key, now);
        true
    }

    pub fn clear(&mut self) {
        self.last_attempt.clear();
    }
}
