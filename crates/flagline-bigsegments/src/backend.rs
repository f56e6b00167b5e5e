// crates/flagline-bigsegments/src/backend.rs
// ============================================================================
// Module: Store Backend Contract
// Description: The trait an external big-segment store implements, plus its
//              sync metadata.
// Purpose: Let Redis/Consul/DynamoDB-style adapters plug into the bridge
//          without the bridge depending on any of their client libraries.
// Dependencies: none
// ============================================================================

use crate::error::BigSegmentError;

/// Freshness metadata a store backend reports alongside membership answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreMetadata {
    /// Epoch-millisecond timestamp of the backend's last successful sync
    /// from the control plane, or `None` if it has never synced.
    pub last_up_to_date_ms: Option<i64>,
}

/// An external big-segment membership store.
///
/// # Invariants
/// - Implementations must be safe to query concurrently; the bridge itself
///   serializes access with a single mutex, but a shared backend instance
///   may also be queried directly by other components.
pub trait BigSegmentStoreBackend: Send + Sync {
    /// Resolves whether `(context_kind, context_key)` is a member of the
    /// segment at `generation`.
    ///
    /// Returns `Ok(Some(true))` for an explicit include, `Ok(Some(false))`
    /// for an explicit exclude, and `Ok(None)` for no membership record.
    ///
    /// # Errors
    ///
    /// Returns [`BigSegmentError::Backend`] if the underlying store cannot
    /// be reached or returns malformed data.
    fn fetch_membership(
        &self,
        context_kind: &str,
        context_key: &str,
        generation: i64,
    ) -> Result<Option<bool>, BigSegmentError>;

    /// Reports this backend's last-sync freshness.
    ///
    /// # Errors
    ///
    /// Returns [`BigSegmentError::Backend`] if the underlying store cannot
    /// be reached.
    fn metadata(&self) -> Result<StoreMetadata, BigSegmentError>;
}
