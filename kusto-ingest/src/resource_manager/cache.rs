use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_lock::RwLock;

/// A value with a freshness window: once the time-to-live has elapsed, the
/// next reader is expected to fetch a replacement.
#[derive(Debug, Clone)]
pub struct Expiring<T> {
    value: T,
    fetched_at: Instant,
    time_to_live: Duration,
}

impl<T> Expiring<T> {
    pub fn new(value: T, time_to_live: Duration) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
            time_to_live,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < self.time_to_live
    }

    /// Swaps in a replacement and restarts the freshness window.
    pub fn replace(&mut self, value: T) {
        self.value = value;
        self.fetched_at = Instant::now();
    }

    #[cfg(test)]
    pub fn age_past_ttl_for_test(&mut self) {
        self.fetched_at = Instant::now() - self.time_to_live;
    }
}

/// A shared [Expiring] slot refreshed under a double-checked write lock, so
/// only one fetch is in flight per slot.
pub type Refreshing<T> = Arc<RwLock<Expiring<T>>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_value_is_readable() {
        let slot = Expiring::new("hello".to_string(), Duration::from_secs(60));
        assert_eq!(slot.value(), "hello");
        assert!(slot.is_fresh());
    }

    #[test]
    fn freshness_expires_with_the_ttl() {
        let mut slot = Expiring::new("hello".to_string(), Duration::from_secs(60));
        slot.age_past_ttl_for_test();
        assert!(!slot.is_fresh());
    }

    #[test]
    fn replacement_restarts_the_window() {
        let mut slot = Expiring::new("hello".to_string(), Duration::from_secs(60));
        slot.age_past_ttl_for_test();
        slot.replace("world".to_string());

        assert!(slot.is_fresh());
        assert_eq!(slot.value(), "world");
    }
}
