// crates/flagline-bigsegments/src/cache.rs
// ============================================================================
// Module: Membership Cache
// Description: A bounded, TTL-expiring cache of per-context membership
//              answers, avoiding a backend round trip on every evaluation.
// Purpose: Keep the common case (a context evaluated repeatedly against the
//          same big segment) off the network.
// Dependencies: lru
// ============================================================================

use std::num::NonZeroUsize;
use std::time::Duration;
use std::time::Instant;

use lru::LruCache;

struct CachedEntry {
    membership: Option<bool>,
    cached_at: Instant,
}

/// Caches `(context_kind, context_key, generation) -> membership` answers
/// for `ttl`, evicting the least-recently-used entry past `capacity`.
pub struct MembershipCache {
    cache: LruCache<String, CachedEntry>,
    ttl: Duration,
}

impl MembershipCache {
    /// Creates a cache with the given capacity and time-to-live.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { cache: LruCache::new(capacity), ttl }
    }

    /// Returns a cached membership answer for `key`, if present and not
    /// past its time-to-live.
    pub fn get(&mut self, key: &str, now: Instant) -> Option<Option<bool>> {
        let entry = self.cache.get(key)?;
        if now.saturating_duration_since(entry.cached_at) >= self.ttl {
            return None;
        }
        Some(entry.membership)
    }

    /// Records a membership answer for `key`.
    pub fn put(&mut self, key: String, membership: Option<bool>, now: Instant) {
        self.cache.put(key, CachedEntry { membership, cached_at: now });
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
    fn fresh_entry_is_returned() {
        let mut cache = MembershipCache::new(10, Duration::from_secs(5));
        let now = Instant::now();
        cache.put("a".to_owned(), Some(true), now);
        assert_eq!(cache.get("a", now), Some(Some(true)));
    }

    #[test]
    fn expired_entry_is_treated_as_absent() {
        let mut cache = MembershipCache::new(10, Duration::from_millis(10));
        let now = Instant::now();
        cache.put("a".to_owned(), Some(true), now);
        let later = now + Duration::from_millis(50);
        assert_eq!(cache.get("a", later), None);
    }

    #[test]
    fn missing_key_is_absent() {
        let mut cache = MembershipCache::new(10, Duration::from_secs(5));
        assert_eq!(cache.get("missing", Instant::now()), None);
    }
}
