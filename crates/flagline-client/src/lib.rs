// crates/flagline-client/src/lib.rs
// ============================================================================
// Crate: flagline-client
// Description: Orchestrating client core for the Flagline server SDK: wires
//              the evaluator, data store, data source, big segment bridge,
//              and event pipeline into one lifecycle.
// ============================================================================

//! ## Overview
//! [`client::Client`] is the crate's entry point: a store-generic
//! orchestrator built by [`builder::ClientBuilder`] from an already-wired
//! data store, data source, big segment provider, and event pipeline. It
//! exposes the evaluation, identify/track, and lifecycle surface a host
//! application calls; it owns none of the wire formats or transport those
//! components use.

pub mod all_flags;
pub mod builder;
pub mod client;
pub mod detail;
pub mod error;
pub mod source;

pub use all_flags::AllFlagsOptions;
pub use all_flags::AllFlagsState;
pub use all_flags::FlagState;
pub use builder::ClientBuilder;
pub use builder::DEFAULT_START_WAIT;
pub use client::Client;
pub use detail::EvalDetail;
pub use error::ClientError;
pub use source::DataSourceHandle;
