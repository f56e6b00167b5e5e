// crates/flagline-bigsegments/src/error.rs
// ============================================================================
// Module: Big Segment Errors
// Description: Failure modes surfaced by store backends and the registry.
// Purpose: Distinguish a missing/denied backend from a live backend that
//          itself failed.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// A failure encountered resolving or querying a big segment store.
#[derive(Debug, Error)]
pub enum BigSegmentError {
    /// No backend is registered under the requested identifier.
    #[error("no big segment store registered under {0:?}")]
    NotRegistered(String),
    /// The registry's access policy denied this identifier.
    #[error("big segment store {0:?} is denied by policy")]
    PolicyDenied(String),
    /// The backend itself raised an error while serving a query.
    #[error("big segment store error: {0}")]
    Backend(String),
}
