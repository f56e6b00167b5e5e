// crates/flagline-store/src/repository.rs
// ============================================================================
// Module: Typed Repository Adapter
// Description: Deserializes the opaque JSON blobs a `DataStore` holds into
//              `Flag`/`Segment` values for the evaluator.
// Purpose: Keep `DataStore` drivers schema-agnostic while still giving
//          `flagline-eval::Repository` typed data.
// Dependencies: flagline-core, flagline-eval, serde_json
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use flagline_core::DataKind;
use flagline_core::DataStore;
use flagline_core::Flag;
use flagline_core::Segment;
use flagline_eval::Repository;

/// Adapts any [`DataStore`] into a [`Repository`], silently treating a
/// failed read or an undeserializable blob as "not found" rather than
/// propagating the driver error into the evaluator.
pub struct TypedRepository<'a, S: DataStore> {
    store: &'a S,
}

impl<'a, S: DataStore> TypedRepository<'a, S> {
    /// Wraps a store reference for evaluator use.
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }
}

impl<S: DataStore> Repository for TypedRepository<'_, S> {
    fn get_flag(&self, key: &str) -> Option<Flag> {
        let value = self.store.get(DataKind::Flags, key).ok().flatten()?;
        serde_json::from_value(value).ok()
    }

    fn get_segment(&self, key: &str) -> Option<Segment> {
        let value = self.store.get(DataKind::Segments, key).ok().flatten()?;
        serde_json::from_value(value).ok()
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "test assertions favor panics over error propagation"
    )]

    use flagline_core::FlagKey;
    use flagline_core::StoredItem;
    use flagline_core::VariationOrRollout;
    use serde_json::json;

    use super::*;
    use crate::memory::MemoryDataStore;

    #[test]
    fn typed_repository_deserializes_stored_flag() {
        let store = MemoryDataStore::new();
        let flag = Flag {
            key: FlagKey::new("f"),
            version: 1,
            on: true,
            variations: vec![json!(true), json!(false)],
            off_variation: None,
            fallthrough: VariationOrRollout::Variation { variation: 0 },
            targets: Vec::new(),
            context_targets: Vec::new(),
            rules: Vec::new(),
            prerequisites: Vec::new(),
            salt: "s".to_owned(),
            track_events: false,
            track_events_fallthrough: false,
            debug_events_until_date: None,
            client_side_availability: flagline_core::ClientSideAvailability::default(),
            sampling_ratio: None,
            exclude_from_summaries: false,
            migration: None,
        };
        let blob = serde_json::to_value(&flag).expect("serializable");
        store.upsert(DataKind::Flags, "f", StoredItem::live(1, blob)).expect("infallible");

        let repo = TypedRepository::new(&store);
        let loaded = repo.get_flag("f").expect("present");
        assert_eq!(loaded.key, flag.key);
        assert!(repo.get_segment("missing").is_none());
    }
}
