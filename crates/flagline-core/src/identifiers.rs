// crates/flagline-core/src/identifiers.rs
// ============================================================================
// Module: Flag and Segment Identifiers
// Description: Newtype wrappers around the string keys used to name flags
//              and segments.
// Purpose: Prevent accidental mixing of flag keys, segment keys, and context
//          keys at call sites that take more than one `String` parameter.
// Dependencies: serde
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// The unique key naming a flag within an environment.
///
/// # Invariants
/// - Never empty; construction from an empty string is rejected by callers
///   that validate (the data source does so before an upsert reaches the
///   store).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagKey(String);

impl FlagKey {
    /// Wraps a raw string as a flag key without validation.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FlagKey {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for FlagKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The unique key naming a segment within an environment.
///
/// # Invariants
/// - Never empty; construction from an empty string is rejected by callers
///   that validate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentKey(String);

impl SegmentKey {
    /// Wraps a raw string as a segment key without validation.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SegmentKey {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for SegmentKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "test assertions favor panics over error propagation"
    )]

    use super::FlagKey;
    use super::SegmentKey;

    #[test]
    fn flag_key_round_trips_through_display() {
        let key = FlagKey::from("dark-mode");
        assert_eq!(key.as_str(), "dark-mode");
        assert_eq!(key.to_string(), "dark-mode");
    }

    #[test]
    fn distinct_key_types_are_distinct_types() {
        let flag = FlagKey::new("shared-name");
        let segment = SegmentKey::new("shared-name");
        assert_eq!(flag.as_str(), segment.as_str());
    }
}
