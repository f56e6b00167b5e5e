// crates/flagline-bigsegments/src/bridge.rs
// ============================================================================
// Module: Big Segment Bridge
// Description: The evaluator-facing adapter resolving out-of-band segment
//              membership through a registered store backend, cached and
//              staleness-tagged.
// Purpose: Give the evaluator a single, cheap `query` call that hides cache
//          lookups, backend round trips, and freshness classification.
// Dependencies: flagline-core
// ============================================================================

//! ## Overview
//! A single mutex guards both the membership cache and the one backend
//! call a cache miss requires, so concurrent evaluations naturally
//! serialize behind it rather than each hammering the backend on a cold
//! cache. Any backend error is folded into [`BigSegmentsStatus::StoreError`]
//! and a non-match, per the contract the evaluator relies on.

use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use flagline_core::BigSegmentMembership;
use flagline_core::BigSegmentsProvider;
use flagline_core::BigSegmentsStatus;

use crate::cache::MembershipCache;
use crate::registry::BigSegmentStoreRegistry;

/// Default per-context membership cache capacity.
pub const DEFAULT_CACHE_CAPACITY: usize = 1_000;
/// Default per-context membership cache time-to-live.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5);
/// Default staleness threshold applied to a backend's last-sync timestamp.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(2 * 60);

/// Configuration for a [`BigSegmentBridge`].
#[derive(Debug, Clone)]
pub struct BigSegmentBridgeConfig {
    /// The registry identifier of the backend this bridge queries.
    pub store_id: String,
    /// Per-context membership cache capacity.
    pub cache_capacity: usize,
    /// Per-context membership cache time-to-live.
    pub cache_ttl: Duration,
    /// How old a backend's last sync may be before results are tagged
    /// `Stale`.
    pub stale_after: Duration,
}

impl BigSegmentBridgeConfig {
    /// Builds a config targeting `store_id` with default cache and
    /// staleness settings.
    #[must_use]
    pub fn new(store_id: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: DEFAULT_CACHE_TTL,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

struct BridgeState {
    cache: MembershipCache,
}

/// Resolves big-segment membership for the evaluator against a registered
/// store backend.
pub struct BigSegmentBridge {
    registry: BigSegmentStoreRegistry,
    config: BigSegmentBridgeConfig,
    state: Mutex<BridgeState>,
}

impl BigSegmentBridge {
    /// Builds a bridge over `registry`, targeting the backend named in
    /// `config`.
    #[must_use]
    pub fn new(registry: BigSegmentStoreRegistry, config: BigSegmentBridgeConfig) -> Self {
        let cache = MembershipCache::new(config.cache_capacity, config.cache_ttl);
        Self { registry, config, state: Mutex::new(BridgeState { cache }) }
    }
}

fn cache_key(context_kind: &str, context_key: &str, generation: i64) -> String {
    format!("{generation}:{context_kind}:{context_key}")
}

fn now_ms() -> i64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}

impl BigSegmentsProvider for BigSegmentBridge {
    fn query(&self, context_kind: &str, context_key: &str, generation: i64) -> (BigSegmentMembership, BigSegmentsStatus) {
        let backend = match self.registry.resolve(&self.config.store_id) {
            Ok(backend) => backend,
            Err(_not_registered_or_denied) => return (BigSegmentMembership::Absent, BigSegmentsStatus::NotConfigured),
        };

        #[allow(clippy::unwrap_used, reason = "poisoned mutex indicates a prior panic in this process; propagating would only mask it")]
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let key = cache_key(context_kind, context_key, generation);

        let membership = match state.cache.get(&key, now) {
            Some(cached) => cached,
            None => match backend.fetch_membership(context_kind, context_key, generation) {
                Ok(membership) => {
                    state.cache.put(key, membership, now);
                    membership
                }
                Err(_backend_error) => return (BigSegmentMembership::Absent, BigSegmentsStatus::StoreError),
            },
        };

        let stale_after_ms = i64::try_from(self.config.stale_after.as_millis()).unwrap_or(i64::MAX);
        let status = match backend.metadata() {
            Ok(metadata) => match metadata.last_up_to_date_ms {
                Some(last_sync) if now_ms().saturating_sub(last_sync) <= stale_after_ms => BigSegmentsStatus::Healthy,
                Some(_stale_sync) => BigSegmentsStatus::Stale,
                None => BigSegmentsStatus::Stale,
            },
            Err(_backend_error) => BigSegmentsStatus::StoreError,
        };

        let resolved = match membership {
            Some(true) => BigSegmentMembership::Included,
            Some(false) => BigSegmentMembership::Excluded,
            None => BigSegmentMembership::Absent,
        };
        (resolved, status)
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "test assertions favor panics over error propagation"
    )]

    use std::sync::Arc;

    use super::*;
    use crate::memory::InMemoryBigSegmentStore;
    use crate::registry::BigSegmentAccessPolicy;

    fn bridge_with(store: Arc<InMemoryBigSegmentStore>) -> BigSegmentBridge {
        let mut registry = BigSegmentStoreRegistry::new(BigSegmentAccessPolicy::default());
        registry.register("memory", store);
        BigSegmentBridge::new(registry, BigSegmentBridgeConfig::new("memory"))
    }

    #[test]
    fn unconfigured_backend_reports_not_configured() {
        let registry = BigSegmentStoreRegistry::new(BigSegmentAccessPolicy::default());
        let bridge = BigSegmentBridge::new(registry, BigSegmentBridgeConfig::new("missing"));
        let (membership, status) = bridge.query("user", "a", 1);
        assert_eq!(membership, BigSegmentMembership::Absent);
        assert_eq!(status, BigSegmentsStatus::NotConfigured);
    }

    #[test]
    fn fresh_sync_reports_healthy_and_included() {
        let store = Arc::new(InMemoryBigSegmentStore::new());
        store.set_membership("user", "a", 1, true);
        store.touch_sync(now_ms());
        let bridge = bridge_with(store);

        let (membership, status) = bridge.query("user", "a", 1);
        assert_eq!(membership, BigSegmentMembership::Included);
        assert_eq!(status, BigSegmentsStatus::Healthy);
    }

    #[test]
    fn old_sync_reports_stale() {
        let store = Arc::new(InMemoryBigSegmentStore::new());
        store.set_membership("user", "a", 1, false);
        let three_minutes_ms = i64::try_from(Duration::from_secs(3 * 60).as_millis()).expect("fits i64");
        store.touch_sync(now_ms() - three_minutes_ms);
        let bridge = bridge_with(store);

        let (membership, status) = bridge.query("user", "a", 1);
        assert_eq!(membership, BigSegmentMembership::Excluded);
        assert_eq!(status, BigSegmentsStatus::Stale);
    }

    #[test]
    fn never_synced_reports_stale() {
        let store = Arc::new(InMemoryBigSegmentStore::new());
        let bridge = bridge_with(store);
        let (_membership, status) = bridge.query("user", "a", 1);
        assert_eq!(status, BigSegmentsStatus::Stale);
    }
}
