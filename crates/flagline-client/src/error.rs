// crates/flagline-client/src/error.rs
// ============================================================================
// Module: Client Errors
// Description: Failure modes surfaced while constructing or driving a
//              client core.
// Purpose: Give `ClientBuilder::build` and the few fallible public methods
//          a typed error instead of propagating a driver's own error type.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// A failure encountered while constructing or operating a [`crate::Client`].
///
/// Evaluation itself never returns this type; a failed evaluation serves the
/// caller's default value and attaches an `ERROR` reason instead, per the
/// error handling design every evaluation method follows.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The underlying data store rejected a read or write.
    #[error("data store error: {0}")]
    Store(String),
    /// The configured data source failed to start.
    #[error("data source error: {0}")]
    DataSource(#[from] flagline_datasource::DataSourceError),
    /// The event sender could not be built.
    #[error("event delivery error: {0}")]
    Events(#[from] flagline_events::DeliveryError),
    /// A configuration value was invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
