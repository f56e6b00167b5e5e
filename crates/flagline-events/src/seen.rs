// crates/flagline-events/src/seen.rs
// ============================================================================
// Module: Seen-Context Tracker
// Description: A bounded, TTL-expiring cache of context keys already seen
//              within the current window, used to gate index event
//              emission.
// Purpose: Emit an `index` event only on a context's first sighting per
//          interval, not once per evaluation.
// Dependencies: lru
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::num::NonZeroUsize;
use std::time::Duration;
use std::time::Instant;

use lru::LruCache;

/// Tracks which fully-qualified context keys have already produced an index
/// event within `ttl`.
pub struct SeenContexts {
    cache: LruCache<String, Instant>,
    ttl: Duration,
}

impl SeenContexts {
    /// Creates a tracker with the given capacity and time-to-live.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { cache: LruCache::new(capacity), ttl }
    }

    /// Records a sighting of `key` at `now`, returning `true` if this is a
    /// fresh sighting (the key was absent or its prior sighting has
    /// expired) that should generate an index event.
    pub fn observe(&mut self, key: &str, now: Instant) -> bool {
        if let Some(last_seen) = self.cache.get(key)
            && now.saturating_duration_since(*last_seen) < self.ttl
        {
            self.cache.put(key.to_owned(), now);
            return false;
        }
        self.cache.put(key.to_owned(), now);
        true
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "test assertions favor panics over error propagation"
    )]

    use super::*;

    #[test]
    fn first_sighting_is_fresh() {
        let mut seen = SeenContexts::new(10, Duration::from_secs(60));
        assert!(seen.observe("a", Instant::now()));
    }

    #[test]
    fn repeated_sighting_within_ttl_is_not_fresh() {
        let mut seen = SeenContexts::new(10, Duration::from_secs(60));
        let now = Instant::now();
        assert!(seen.observe("a", now));
        assert!(!seen.observe("a", now));
    }

    #[test]
    fn sighting_after_ttl_expiry_is_fresh_again() {
        let mut seen = SeenContexts::new(10, Duration::from_millis(10));
        let now = Instant::now();
        assert!(seen.observe("a", now));
        let later = now + Duration::from_millis(50);
        assert!(seen.observe("a", later));
    }

    #[test]
    fn capacity_eviction_forgets_the_oldest_key() {
        let mut seen = SeenContexts::new(1, Duration::from_secs(60));
        let now = Instant::now();
        assert!(seen.observe("a", now));
        assert!(seen.observe("b", now));
        assert!(seen.observe("a", now));
    }
}
