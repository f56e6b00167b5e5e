// crates/flagline-core/src/lib.rs
// ============================================================================
// Module: Flagline Core Library
// Description: Shared data model, interfaces, and status types for the
//              Flagline feature-flag SDK core.
// Purpose: Give every other Flagline crate a single, dependency-free
//          vocabulary for contexts, flags, segments, and component contracts.
// Dependencies: serde, serde_json, thiserror, time
// ============================================================================

//! ## Overview
//! `flagline-core` has no dependency on any other Flagline crate: it defines
//! the evaluation context and flag/segment data model (§3 of the design),
//! the small set of traits each subsystem implements against
//! (`DataStore`, `DataSourceUpdateSink`, `BigSegmentStoreBackend`,
//! `EventSender`), and the two status-provider lifecycles. Everything here is
//! plain data plus trait objects; no networking, no threads, no file I/O.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod context;
pub mod error;
pub mod identifiers;
pub mod model;
pub mod status;
pub mod store_api;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use context::AttributeRef;
pub use context::Context;
pub use context::ContextKind;
pub use error::CoreError;
pub use identifiers::FlagKey;
pub use identifiers::SegmentKey;
pub use model::Clause;
pub use model::ClauseOp;
pub use model::ClientSideAvailability;
pub use model::Flag;
pub use model::FlagRule;
pub use model::Prerequisite;
pub use model::Rollout;
pub use model::RolloutKind;
pub use model::Segment;
pub use model::SegmentRule;
pub use model::Target;
pub use model::VariationOrRollout;
pub use model::WeightedVariation;
pub use status::DataSourceState;
pub use status::DataSourceStatus;
pub use status::DataStoreStatus;
pub use status::StatusBroadcaster;
pub use store_api::BigSegmentMembership;
pub use store_api::BigSegmentsProvider;
pub use store_api::BigSegmentsStatus;
pub use store_api::DataKind;
pub use store_api::DataStore;
pub use store_api::StoredItem;
