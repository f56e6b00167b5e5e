// crates/flagline-store/src/lib.rs
// ============================================================================
// Module: Flagline Data Store
// Description: In-memory and SQLite-backed implementations of the
//              flag/segment snapshot contract, plus a typed view over either.
// Purpose: Give the evaluator a `Repository` and the data source a
//          `DataStore` to replicate into, independent of persistence choice.
// Dependencies: flagline-core, flagline-eval, rusqlite, sha2, thiserror
// ============================================================================

//! ## Overview
//! [`memory::MemoryDataStore`] is the default, always-available backing
//! store. [`sqlite::SqliteDataStore`] is an optional durable driver behind
//! the same [`flagline_core::DataStore`] contract, so a host can restart
//! without a full re-fetch from the data source. [`repository::TypedRepository`]
//! adapts either one into the `flagline-eval` `Repository` trait by
//! deserializing the opaque JSON blobs the store itself never parses.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod memory;
pub mod repository;
pub mod sqlite;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::SqliteStoreError;
pub use memory::MemoryDataStore;
pub use repository::TypedRepository;
pub use sqlite::SqliteDataStore;
pub use sqlite::SqliteStoreConfig;
