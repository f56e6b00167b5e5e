// crates/flagline-store/src/memory.rs
// ============================================================================
// Module: In-Memory Data Store
// Description: The default `DataStore` backing: two `RwLock`-guarded maps,
//              one per `DataKind`.
// Purpose: Serve reads without a lock held across a network call, and apply
//          the monotonic-version upsert rule in-process.
// Dependencies: flagline-core, std::sync
// ============================================================================

//! ## Overview
//! This store never fails; its `Error` type is [`std::convert::Infallible`].
//! A host that wants persistence across restarts layers
//! [`crate::sqlite::SqliteDataStore`] underneath instead of replacing this
//! type, since the evaluator only ever sees the `DataStore` trait.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::RwLock;

use flagline_core::DataKind;
use flagline_core::DataStore;
use flagline_core::DataStoreStatus;
use flagline_core::StatusBroadcaster;
use flagline_core::StoredItem;

/// An in-memory, thread-safe snapshot of flags and segments.
pub struct MemoryDataStore {
    flags: RwLock<BTreeMap<String, StoredItem>>,
    segments: RwLock<BTreeMap<String, StoredItem>>,
    initialized: RwLock<bool>,
    status: StatusBroadcaster<DataStoreStatus>,
}

impl Default for MemoryDataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDataStore {
    /// Builds an empty, uninitialized store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flags: RwLock::new(BTreeMap::new()),
            segments: RwLock::new(BTreeMap::new()),
            initialized: RwLock::new(false),
            status: StatusBroadcaster::new(DataStoreStatus::available()),
        }
    }

    /// The store's observable availability status. An in-memory store is
    /// always available; this exists so callers layering persistence on top
    /// have a uniform status surface to subscribe to.
    #[must_use]
    pub const fn status(&self) -> &StatusBroadcaster<DataStoreStatus> {
        &self.status
    }

    fn collection(&self, kind: DataKind) -> &RwLock<BTreeMap<String, StoredItem>> {
        match kind {
            DataKind::Flags => &self.flags,
            DataKind::Segments => &self.segments,
        }
    }
}

impl DataStore for MemoryDataStore {
    type Error = Infallible;

    fn init(&self, flags: Vec<(String, StoredItem)>, segments: Vec<(String, StoredItem)>) -> Result<(), Infallible> {
        #[allow(clippy::unwrap_used, reason = "poisoned mutex indicates a prior panic in this process; propagating would only mask it")]
        {
            *self.flags.write().unwrap() = flags.into_iter().collect();
            *self.segments.write().unwrap() = segments.into_iter().collect();
            *self.initialized.write().unwrap() = true;
        }
        Ok(())
    }

    fn upsert(&self, kind: DataKind, key: &str, item: StoredItem) -> Result<(), Infallible> {
        #[allow(clippy::unwrap_used, reason = "poisoned mutex indicates a prior panic in this process; propagating would only mask it")]
        let mut guard = self.collection(kind).write().unwrap();
        let should_apply = guard.get(key).is_none_or(|existing| existing.version < item.version);
        if should_apply {
            guard.insert(key.to_owned(), item);
        }
        Ok(())
    }

    fn get(&self, kind: DataKind, key: &str) -> Result<Option<serde_json::Value>, Infallible> {
        #[allow(clippy::unwrap_used, reason = "poisoned mutex indicates a prior panic in this process; propagating would only mask it")]
        let guard = self.collection(kind).read().unwrap();
        Ok(guard.get(key).and_then(|item| item.data.clone()))
    }

    fn all(&self, kind: DataKind) -> Result<Vec<(String, serde_json::Value)>, Infallible> {
        #[allow(clippy::unwrap_used, reason = "poisoned mutex indicates a prior panic in this process; propagating would only mask it")]
        let guard = self.collection(kind).read().unwrap();
        Ok(guard
            .iter()
            .filter_map(|(key, item)| item.data.clone().map(|data| (key.clone(), data)))
            .collect())
    }

    fn initialized(&self) -> Result<bool, Infallible> {
        #[allow(clippy::unwrap_used, reason = "poisoned mutex indicates a prior panic in this process; propagating would only mask it")]
        Ok(*self.initialized.read().unwrap())
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "test assertions favor panics over error propagation"
    )]

    use serde_json::json;

    use super::*;

    #[test]
    fn upsert_rejects_stale_version() {
        let store = MemoryDataStore::new();
        store.upsert(DataKind::Flags, "f", StoredItem::live(5, json!({"v": 1}))).expect("infallible");
        store.upsert(DataKind::Flags, "f", StoredItem::live(3, json!({"v": 2}))).expect("infallible");
        let stored = store.get(DataKind::Flags, "f").expect("infallible").expect("present");
        assert_eq!(stored, json!({"v": 1}));
    }

    #[test]
    fn tombstone_is_hidden_from_get_and_all() {
        let store = MemoryDataStore::new();
        store.upsert(DataKind::Flags, "f", StoredItem::live(1, json!({}))).expect("infallible");
        store.upsert(DataKind::Flags, "f", StoredItem::tombstone(2)).expect("infallible");
        assert_eq!(store.get(DataKind::Flags, "f").expect("infallible"), None);
        assert!(store.all(DataKind::Flags).expect("infallible").is_empty());
    }

    #[test]
    fn init_replaces_both_collections_atomically() {
        let store = MemoryDataStore::new();
        assert!(!store.initialized().expect("infallible"));
        store
            .init(vec![("f".to_owned(), StoredItem::live(1, json!({})))], vec![("s".to_owned(), StoredItem::live(1, json!({})))])
            .expect("infallible");
        assert!(store.initialized().expect("infallible"));
        assert_eq!(store.all(DataKind::Flags).expect("infallible").len(), 1);
        assert_eq!(store.all(DataKind::Segments).expect("infallible").len(), 1);
    }
}
