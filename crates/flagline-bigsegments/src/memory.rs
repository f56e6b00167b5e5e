// crates/flagline-bigsegments/src/memory.rs
// ============================================================================
// Module: In-Memory Store Backend
// Description: A built-in, test-and-embedded-use big segment store with no
//              external dependency.
// Purpose: Give the registry a backend it can register out of the box, and
//          give tests a controllable membership source.
// Dependencies: none
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;

use crate::backend::BigSegmentStoreBackend;
use crate::backend::StoreMetadata;
use crate::error::BigSegmentError;

/// A membership key: `(context_kind, context_key, segment_generation)`.
type MembershipKey = (String, String, i64);

/// An in-process big segment store, seeded directly by the host process
/// rather than synced from a remote database.
#[derive(Default)]
pub struct InMemoryBigSegmentStore {
    records: Mutex<HashMap<MembershipKey, bool>>,
    last_sync_ms: Mutex<Option<i64>>,
}

impl InMemoryBigSegmentStore {
    /// Creates an empty store with no recorded sync.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an explicit include/exclude membership for one context.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned by a prior panic on this
    /// store.
    pub fn set_membership(&self, context_kind: &str, context_key: &str, generation: i64, included: bool) {
        #[allow(clippy::unwrap_used, reason = "poisoned mutex indicates a prior panic in this process; propagating would only mask it")]
        let mut records = self.records.lock().unwrap();
        records.insert((context_kind.to_owned(), context_key.to_owned(), generation), included);
    }

    /// Marks the store as having synced at the given epoch-millisecond
    /// timestamp.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned by a prior panic on this
    /// store.
    pub fn touch_sync(&self, now_ms: i64) {
        #[allow(clippy::unwrap_used, reason = "poisoned mutex indicates a prior panic in this process; propagating would only mask it")]
        let mut last_sync = self.last_sync_ms.lock().unwrap();
        *last_sync = Some(now_ms);
    }
}

impl BigSegmentStoreBackend for InMemoryBigSegmentStore {
    fn fetch_membership(
        &self,
        context_kind: &str,
        context_key: &str,
        generation: i64,
    ) -> Result<Option<bool>, BigSegmentError> {
        #[allow(clippy::unwrap_used, reason = "poisoned mutex indicates a prior panic in this process; propagating would only mask it")]
        let records = self.records.lock().unwrap();
        Ok(records.get(&(context_kind.to_owned(), context_key.to_owned(), generation)).copied())
    }

    fn metadata(&self) -> Result<StoreMetadata, BigSegmentError> {
        #[allow(clippy::unwrap_used, reason = "poisoned mutex indicates a prior panic in this process; propagating would only mask it")]
        let last_sync = self.last_sync_ms.lock().unwrap();
        Ok(StoreMetadata { last_up_to_date_ms: *last_sync })
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
    fn unseeded_context_has_no_membership_record() {
        let store = InMemoryBigSegmentStore::new();
        let result = store.fetch_membership("user", "a", 1).expect("no error");
        assert_eq!(result, None);
    }

    #[test]
    fn seeded_membership_round_trips() {
        let store = InMemoryBigSegmentStore::new();
        store.set_membership("user", "a", 1, true);
        assert_eq!(store.fetch_membership("user", "a", 1).expect("no error"), Some(true));
        assert_eq!(store.fetch_membership("user", "b", 1).expect("no error"), None);
    }

    #[test]
    fn metadata_reports_last_sync() {
        let store = InMemoryBigSegmentStore::new();
        assert_eq!(store.metadata().expect("no error").last_up_to_date_ms, None);
        store.touch_sync(1_000);
        assert_eq!(store.metadata().expect("no error").last_up_to_date_ms, Some(1_000));
    }
}
