// crates/flagline-bigsegments/src/registry.rs
// ============================================================================
// Module: Store Registry
// Description: Registry for built-in and external big segment store
//              backends, with allow/deny access policy.
// Purpose: Let a deployment register several backends by identifier and
//          restrict which of them may actually be queried.
// Dependencies: none
// ============================================================================

//! ## Overview
//! The registry resolves backends by identifier and enforces allowlist and
//! denylist policy before handing one back, the same shape the evidence
//! provider registry this crate's bridge is modeled on uses.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::backend::BigSegmentStoreBackend;
use crate::error::BigSegmentError;

/// Access policy controlling which store identifiers may be queried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigSegmentAccessPolicy {
    /// Optional allowlist of store identifiers.
    pub allowlist: Option<BTreeSet<String>>,
    /// Explicit denylist of store identifiers.
    pub denylist: BTreeSet<String>,
}

impl BigSegmentAccessPolicy {
    /// Returns a policy that permits every registered identifier.
    #[must_use]
    pub const fn allow_all() -> Self {
        Self { allowlist: None, denylist: BTreeSet::new() }
    }

    /// Returns whether `store_id` is allowed by this policy.
    #[must_use]
    pub fn is_allowed(&self, store_id: &str) -> bool {
        if self.denylist.contains(store_id) {
            return false;
        }
        match &self.allowlist {
            Some(allowlist) => allowlist.contains(store_id),
            None => true,
        }
    }
}

impl Default for BigSegmentAccessPolicy {
    fn default() -> Self {
        Self::allow_all()
    }
}

/// Registry of big segment store backends, keyed by identifier.
pub struct BigSegmentStoreRegistry {
    backends: BTreeMap<String, Arc<dyn BigSegmentStoreBackend>>,
    policy: BigSegmentAccessPolicy,
}

impl BigSegmentStoreRegistry {
    /// Creates an empty registry under the given policy.
    #[must_use]
    pub fn new(policy: BigSegmentAccessPolicy) -> Self {
        Self { backends: BTreeMap::new(), policy }
    }

    /// Registers a backend under `store_id`, replacing any prior
    /// registration under the same identifier.
    pub fn register(&mut self, store_id: impl Into<String>, backend: Arc<dyn BigSegmentStoreBackend>) {
        self.backends.insert(store_id.into(), backend);
    }

    /// Returns the configured policy.
    #[must_use]
    pub const fn policy(&self) -> &BigSegmentAccessPolicy {
        &self.policy
    }

    /// Resolves the backend registered under `store_id`, subject to policy.
    ///
    /// # Errors
    ///
    /// Returns [`BigSegmentError::PolicyDenied`] if policy excludes
    /// `store_id`, or [`BigSegmentError::NotRegistered`] if no backend is
    /// registered under it.
    pub fn resolve(&self, store_id: &str) -> Result<Arc<dyn BigSegmentStoreBackend>, BigSegmentError> {
        if !self.policy.is_allowed(store_id) {
            return Err(BigSegmentError::PolicyDenied(store_id.to_owned()));
        }
        self.backends.get(store_id).cloned().ok_or_else(|| BigSegmentError::NotRegistered(store_id.to_owned()))
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
    use crate::memory::InMemoryBigSegmentStore;

    #[test]
    fn unregistered_identifier_is_not_registered() {
        let registry = BigSegmentStoreRegistry::new(BigSegmentAccessPolicy::default());
        assert!(matches!(registry.resolve("redis"), Err(BigSegmentError::NotRegistered(_))));
    }

    #[test]
    fn denylist_blocks_a_registered_backend() {
        let mut registry = BigSegmentStoreRegistry::new(BigSegmentAccessPolicy {
            allowlist: None,
            denylist: BTreeSet::from(["redis".to_owned()]),
        });
        registry.register("redis", Arc::new(InMemoryBigSegmentStore::new()));
        assert!(matches!(registry.resolve("redis"), Err(BigSegmentError::PolicyDenied(_))));
    }

    #[test]
    fn allowlist_permits_only_named_identifiers() {
        let mut registry = BigSegmentStoreRegistry::new(BigSegmentAccessPolicy {
            allowlist: Some(BTreeSet::from(["memory".to_owned()])),
            denylist: BTreeSet::new(),
        });
        registry.register("memory", Arc::new(InMemoryBigSegmentStore::new()));
        registry.register("redis", Arc::new(InMemoryBigSegmentStore::new()));
        assert!(registry.resolve("memory").is_ok());
        assert!(matches!(registry.resolve("redis"), Err(BigSegmentError::PolicyDenied(_))));
    }
}
