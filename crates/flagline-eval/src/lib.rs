// crates/flagline-eval/src/lib.rs
// ============================================================================
// Module: Flagline Evaluation Engine
// Description: Pure decision procedure over the flag/segment rule language.
// Purpose: Turn a `(flag, context, default)` triple into a served value plus
//          a reason, without ever touching the network or a lock that the
//          caller's thread didn't already hold.
// Dependencies: flagline-core, bigdecimal, sha1, hex, regex, semver, time
// ============================================================================

//! ## Overview
//! This crate is deliberately standalone: it depends only on `flagline-core`
//! for the data model, takes its data-store and big-segment reads through
//! small traits ([`Repository`], [`flagline_core::BigSegmentsProvider`]), and
//! never spawns a thread or opens a socket. A host could vendor this crate
//! alone to embed the rule language in an offline tool.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bucketing;
pub mod clauses;
pub mod evaluator;
pub mod reason;
pub mod repository;
pub mod segments;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bucketing::MAX_SEGMENT_RECURSION_DEPTH;
pub use evaluator::evaluate;
pub use evaluator::EvalResult;
pub use evaluator::PrerequisiteEvaluationEvent;
pub use reason::ErrorKind;
pub use reason::Reason;
pub use repository::Repository;
