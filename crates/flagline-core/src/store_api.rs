// crates/flagline-core/src/store_api.rs
// ============================================================================
// Module: Data Store Contract
// Description: The kind-polymorphic data store interface and the big-segment
//              membership contract consulted during segment matching.
// Purpose: Decouple the evaluator from whichever `DataStore` implementation
//          (in-memory or persistent) backs it.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Flags and segments are stored identically from the data store's point of
//! view: an opaque, versioned JSON blob keyed by `(kind, key)`. Typed access
//! (`Flag`, `Segment`) is a thin deserializing wrapper the evaluator and data
//! source apply on top; the store itself never parses the blob, so a
//! persistent driver can stay schema-agnostic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

// ============================================================================
// SECTION: Data Kind
// ============================================================================

/// The two closed collections a [`DataStore`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataKind {
    /// The `flags` collection.
    Flags,
    /// The `segments` collection.
    Segments,
}

impl DataKind {
    /// Returns the collection's name as used in persisted-state keys and
    /// wire paths (`/flags/...`, `/segments/...`).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Flags => "flags",
            Self::Segments => "segments",
        }
    }
}

// ============================================================================
// SECTION: Stored Items
// ============================================================================

/// A single versioned item in a [`DataStore`] collection: either live data or
/// a tombstone recording that the item was deleted at `version`.
///
/// # Invariants
/// - `version` is compared, never assumed equal, when deciding whether an
///   `upsert` should apply (see [`DataStore::upsert`]).
#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    /// The item's version, assigned by the control plane.
    pub version: i64,
    /// The item's JSON payload, or `None` for a tombstone.
    pub data: Option<Value>,
}

impl StoredItem {
    /// Builds a live (non-tombstone) stored item.
    #[must_use]
    pub const fn live(version: i64, data: Value) -> Self {
        Self { version, data: Some(data) }
    }

    /// Builds a tombstone recording a deletion at `version`.
    #[must_use]
    pub const fn tombstone(version: i64) -> Self {
        Self { version, data: None }
    }

    /// Returns whether this item is a tombstone.
    #[must_use]
    pub const fn is_tombstone(&self) -> bool {
        self.data.is_none()
    }
}

// ============================================================================
// SECTION: Data Store Trait
// ============================================================================

/// The storage contract the evaluator and data source share.
///
/// # Invariants
/// - `upsert` is a no-op (the existing item is kept) whenever
///   `existing.version >= new_item.version`: the monotonicity guarantee
///   that lets replayed or out-of-order updates never resurrect a deleted
///   item or regress a live one.
/// - `init` atomically replaces both collections: readers never observe a
///   state where one collection reflects the new snapshot and the other
///   still reflects the old one.
pub trait DataStore: Send + Sync {
    /// The error type surfaced by a failing driver.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Atomically replaces both collections with a full snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` if the underlying driver rejects the write.
    fn init(
        &self,
        flags: Vec<(String, StoredItem)>,
        segments: Vec<(String, StoredItem)>,
    ) -> Result<(), Self::Error>;

    /// Applies a single-item update, subject to the monotonicity rule.
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` if the underlying driver rejects the write.
    fn upsert(&self, kind: DataKind, key: &str, item: StoredItem) -> Result<(), Self::Error>;

    /// Reads a single item, or `None` if absent (never returns tombstones —
    /// callers see a tombstone as "not found").
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` if the underlying driver fails to read.
    fn get(&self, kind: DataKind, key: &str) -> Result<Option<Value>, Self::Error>;

    /// Reads every live (non-tombstone) item in a collection, keyed by item
    /// key.
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` if the underlying driver fails to read.
    fn all(&self, kind: DataKind) -> Result<Vec<(String, Value)>, Self::Error>;

    /// Returns whether `init` has been called at least once (directly, or by
    /// way of restoring persisted state).
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` if the underlying driver fails to read.
    fn initialized(&self) -> Result<bool, Self::Error>;
}

// ============================================================================
// SECTION: Big Segment Membership
// ============================================================================

/// The staleness classification surfaced on an evaluation that consulted the
/// big-segment bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BigSegmentsStatus {
    /// The bridge answered and its last sync is within `stale_after`.
    Healthy,
    /// The bridge answered but its last sync is older than `stale_after`.
    Stale,
    /// The external store raised an error; segment matches are non-matches
    /// for the duration of this evaluation.
    StoreError,
    /// No big-segment store is configured, but a segment referencing one
    /// was evaluated.
    NotConfigured,
}

/// A single context's resolved membership in a big segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BigSegmentMembership {
    /// The context is an included member.
    Included,
    /// The context is an explicitly excluded member.
    Excluded,
    /// The context has no membership record.
    Absent,
}

// ============================================================================
// SECTION: Big Segment Provider
// ============================================================================

/// The contract the evaluator uses to resolve "big" (externally maintained)
/// segment membership without depending on the bridge's implementation
/// crate.
pub trait BigSegmentsProvider: Send + Sync {
    /// Resolves membership for `(context_kind, context_key)` against a
    /// segment at the given `generation`, alongside the bridge's current
    /// staleness classification.
    fn query(
        &self,
        context_kind: &str,
        context_key: &str,
        generation: i64,
    ) -> (BigSegmentMembership, BigSegmentsStatus);
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
    fn stored_item_tombstone_has_no_data() {
        let item = StoredItem::tombstone(3);
        assert!(item.is_tombstone());
        assert_eq!(item.version, 3);
    }

    #[test]
    fn data_kind_name_matches_wire_path_segment() {
        assert_eq!(DataKind::Flags.name(), "flags");
        assert_eq!(DataKind::Segments.name(), "segments");
    }
}
