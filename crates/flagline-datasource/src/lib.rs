// crates/flagline-datasource/src/lib.rs
// ============================================================================
// Module: Flagline Data Source Library
// Description: Streaming and polling replication of flag/segment snapshots,
//              plus the host-policy and change-tracking machinery they share.
// Purpose: Keep a `DataStore` current with the control plane's view of
//          flags and segments, publishing status transitions and flag
//          change notifications as it goes.
// Dependencies: flagline-core, reqwest, serde_json, url, time
// ============================================================================

//! ## Overview
//! Two interchangeable replicators are offered: [`streaming`] (a persistent
//! server-sent-events connection, reconnecting with jittered exponential
//! backoff) and [`polling`] (a fixed-interval full-snapshot fetch). Both
//! share [`http::HttpHostPolicy`] for outbound request hardening and
//! [`changes::ChangeTracker`] for computing which flags may need
//! re-evaluation after a write.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod backoff;
pub mod changes;
pub mod error;
pub mod http;
pub mod polling;
pub mod streaming;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use changes::ChangeTracker;
pub use changes::FlagChangeEvent;
pub use error::DataSourceError;
pub use http::HttpHostPolicy;
pub use polling::PollingConfig;
pub use polling::PollingDataSource;
pub use polling::ReadySignal;
pub use streaming::StreamingConfig;
pub use streaming::StreamingDataSource;

/// Current epoch-millisecond timestamp, used to stamp status transitions.
#[must_use]
pub fn now_ms() -> i64 {
    let now = time::OffsetDateTime::now_utc();
    i64::try_from(now.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}
