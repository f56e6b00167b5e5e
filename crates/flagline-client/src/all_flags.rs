// crates/flagline-client/src/all_flags.rs
// ============================================================================
// Module: All Flags State
// Description: The bulk-evaluation snapshot `Client::all_flags_state` hands
//              back, and the options that shape it.
// Purpose: Let a server-side caller hand every flag's current value to a
//          client-side bootstrap payload without one round trip per flag.
// Dependencies: serde_json
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Value;

/// Options shaping an [`AllFlagsState`] snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllFlagsOptions {
    /// Only include flags marked available to client-side SDKs.
    pub client_side_only: bool,
    /// Omit per-flag metadata (variation, version, reason) for flags that
    /// don't have `track_events` set, keeping the payload small.
    pub details_only_for_tracked_flags: bool,
    /// Include the evaluation reason for every flag included.
    pub with_reasons: bool,
}

/// One flag's entry in an [`AllFlagsState`] snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagState {
    /// The served value.
    pub value: Value,
    /// The variation index served, or `None` if the default was served.
    pub variation: Option<usize>,
    /// The flag's version at evaluation time.
    pub version: i64,
    /// The evaluation reason, present only when requested or required by
    /// `details_only_for_tracked_flags` bookkeeping.
    pub reason: Option<Value>,
    /// Whether this flag is configured to always emit a full feature event.
    pub track_events: bool,
}

/// A bulk snapshot of every flag's evaluation against one context.
#[derive(Debug, Clone, PartialEq)]
pub struct AllFlagsState {
    /// Whether this snapshot reflects an initialized client. `false` means
    /// every entry below was evaluated against a possibly-stale or empty
    /// store.
    pub valid: bool,
    /// Per-flag results, keyed by flag key.
    pub flags: BTreeMap<String, FlagState>,
}
