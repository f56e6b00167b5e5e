// crates/flagline-events/src/error.rs
// ============================================================================
// Module: Event Pipeline Errors
// Description: Failure modes surfaced while delivering an event payload.
// Purpose: Classify delivery failures into retryable vs. permanent so the
//          pipeline knows whether to disable itself.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// A failure encountered while delivering an event payload.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// A transport-level failure (connection reset, timeout, DNS failure).
    #[error("http transport error: {0}")]
    Transport(String),
    /// The control plane returned a non-success status.
    #[error("http status {status}")]
    HttpStatus {
        /// The HTTP status code observed.
        status: u16,
    },
    /// The payload could not be serialized.
    #[error("serialization failure: {0}")]
    Serialize(String),
}

impl DeliveryError {
    /// Returns whether this failure permanently disables the pipeline
    /// rather than simply being dropped after the one retry.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 401 | 403 | 404 | 410 })
    }
}
