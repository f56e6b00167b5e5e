// crates/flagline-datasource/src/error.rs
// ============================================================================
// Module: Data Source Errors
// Description: Failure modes surfaced while fetching or parsing replicated
//              flag/segment data.
// Purpose: Classify failures into recoverable vs. unrecoverable so the
//          reconnection loop knows whether to keep retrying.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// A failure encountered while fetching or applying a data source payload.
#[derive(Debug, Error)]
pub enum DataSourceError {
    /// The request URI was invalid.
    #[error("invalid uri: {0}")]
    InvalidUri(String),
    /// The host or resolved IP was rejected by [`crate::http::HttpHostPolicy`].
    #[error("host policy violation: {0}")]
    Policy(String),
    /// A transport-level failure (connection reset, timeout, DNS failure).
    #[error("http transport error: {0}")]
    Transport(String),
    /// The remote control plane returned a non-success status.
    #[error("http status {status}")]
    HttpStatus {
        /// The HTTP status code observed.
        status: u16,
    },
    /// The response body exceeded the configured byte cap.
    #[error("response exceeded {max_bytes} byte limit")]
    TooLarge {
        /// The configured cap.
        max_bytes: usize,
    },
    /// The payload could not be parsed as the expected wire format.
    #[error("invalid payload: {0}")]
    InvalidData(String),
    /// The underlying data store rejected a write.
    #[error("store error: {0}")]
    Store(String),
}

impl DataSourceError {
    /// Returns whether this failure should be treated as unrecoverable,
    /// ending the reconnection loop instead of retrying with backoff.
    ///
    /// HTTP 401, 403, and 404 are the classic "will never succeed by
    /// retrying" statuses; anything else (5xx, network hiccups, timeouts)
    /// is treated as transient.
    #[must_use]
    pub const fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 401 | 403 | 404 })
    }
}
