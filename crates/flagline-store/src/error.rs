// crates/flagline-store/src/error.rs
// ============================================================================
// Module: Store Errors
// Description: The error type surfaced by the persistent SQLite driver.
// Purpose: Give `SqliteDataStore` a typed `DataStore::Error`.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// Failure modes of [`crate::sqlite::SqliteDataStore`].
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// The database file or its parent directory could not be prepared.
    #[error("sqlite path error: {0}")]
    Path(String),
    /// A `SQLite` operation failed.
    #[error("sqlite error: {0}")]
    Db(#[from] rusqlite::Error),
    /// A stored JSON blob failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// A stored item's hash did not match its recomputed hash; the row is
    /// treated as corrupt rather than served.
    #[error("stored item for key {key:?} failed hash verification")]
    HashMismatch {
        /// The item key whose hash verification failed.
        key: String,
    },
    /// The writer thread's command channel was dropped before a reply
    /// arrived.
    #[error("writer gateway disconnected")]
    WriterGone,
    /// A configuration value was out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
