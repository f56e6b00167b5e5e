// crates/flagline-core/src/error.rs
// ============================================================================
// Module: Core Error Types
// Description: Error kinds shared by the evaluation and data-model layers.
// Purpose: Give every subsystem a common, non-panicking failure vocabulary.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! `CoreError` covers failures that can occur while building or reading the
//! data model itself (context construction, attribute-reference parsing).
//! Subsystem-specific errors (`StoreError`, `DataSourceError`, ...) live in
//! their own crates and convert into `CoreError` only at the point they cross
//! into shared code.

/// Errors raised while constructing or inspecting core data-model values.
///
/// # Invariants
/// - Never constructed from a caught panic; every variant names a concrete
///   validation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// A context was constructed with an empty key.
    #[error("context key must not be empty")]
    EmptyContextKey,
    /// A multi-kind context had a kind that did not match `[A-Za-z0-9._-]+`.
    #[error("invalid context kind: {0}")]
    InvalidContextKind(String),
    /// A multi-kind context repeated the same kind in two parts.
    #[error("duplicate context kind: {0}")]
    DuplicateContextKind(String),
    /// A multi-kind context had no parts.
    #[error("multi-kind context must have at least one part")]
    EmptyMultiKindContext(),
    /// An attribute used a name reserved by the context schema.
    #[error("attribute name is reserved: {0}")]
    ReservedAttributeName(String),
    /// An attribute reference path was malformed (bad `~` escape, empty segment).
    #[error("malformed attribute reference: {0}")]
    MalformedAttributeRef(String),
}
