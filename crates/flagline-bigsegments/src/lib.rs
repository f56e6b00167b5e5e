// crates/flagline-bigsegments/src/lib.rs
// ============================================================================
// Module: Flagline Big Segment Bridge Library
// Description: Out-of-band membership lookup for externally maintained
//              ("big") segments, with caching, staleness tagging, and a
//              pluggable store registry.
// Purpose: Let the evaluator resolve `segmentMatch` clauses against
//          segments too large to ship in the regular flag/segment snapshot.
// Dependencies: flagline-core, lru, thiserror, time
// ============================================================================

//! ## Overview
//! [`bridge::BigSegmentBridge`] implements `flagline_core`'s
//! [`flagline_core::BigSegmentsProvider`] against whichever backend
//! [`registry::BigSegmentStoreRegistry`] resolves for its configured
//! store identifier. [`memory::InMemoryBigSegmentStore`] is the only
//! backend this crate ships; Redis/Consul/DynamoDB-style adapters register
//! under their own identifiers from outside this crate.

pub mod backend;
pub mod bridge;
pub mod cache;
pub mod error;
pub mod memory;
pub mod registry;

pub use backend::BigSegmentStoreBackend;
pub use backend::StoreMetadata;
pub use bridge::BigSegmentBridge;
pub use bridge::BigSegmentBridgeConfig;
pub use error::BigSegmentError;
pub use memory::InMemoryBigSegmentStore;
pub use registry::BigSegmentAccessPolicy;
pub use registry::BigSegmentStoreRegistry;
