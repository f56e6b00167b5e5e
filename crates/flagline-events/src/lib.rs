// crates/flagline-events/src/lib.rs
// ============================================================================
// Module: Flagline Events Library
// Description: Evaluation event summarization, redaction, sampling, and
//              delivery for the Flagline feature-flag SDK core.
// Purpose: Turn raw evaluation/identify/custom/migration submissions into
//          the batched, privacy-respecting payloads the control plane
//          expects, without ever blocking the caller's evaluation path.
// Dependencies: flagline-core, lru, rand, reqwest, serde, serde_json,
//               thiserror, time, url, uuid
// ============================================================================

//! ## Overview
//! [`pipeline::EventPipeline`] is the crate's entry point: it owns a bounded
//! queue, a consumer thread running [`summary::SummaryTable`],
//! [`seen::SeenContexts`], and [`redact::redact_context`], and a timer
//! thread driving both the regular flush cadence and the diagnostic side
//! channel. [`sender::EventSender`] is the only component that talks HTTP.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod diagnostics;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod redact;
pub mod sampling;
pub mod sender;
pub mod seen;
pub mod summary;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use diagnostics::DiagnosticCounters;
pub use diagnostics::DiagnosticId;
pub use error::DeliveryError;
pub use model::EvaluationEvent;
pub use model::InputEvent;
pub use model::MigrationOpEvent;
pub use model::OutputEvent;
pub use pipeline::EventPipeline;
pub use pipeline::EventPipelineConfig;
pub use redact::PrivacyConfig;
pub use sender::EventSender;

/// Current time as epoch milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}
