// crates/flagline-core/src/context.rs
// ============================================================================
// Module: Evaluation Context
// Description: Single-kind and multi-kind evaluation contexts, attribute
//              references, and canonical fully-qualified keys.
// Purpose: Give the evaluator and event pipeline one context representation.
// Dependencies: crate::error, serde_json
// ============================================================================

//! ## Overview
//! A [`Context`] is the subject of a flag evaluation. It is either a single
//! record (`kind`, `key`, attributes) or a `multi` composite of several
//! single-kind parts, one per kind. The canonical fully-qualified key used
//! for bucketing, caching, and event de-duplication is computed once at
//! construction time.
//!
//! # Invariants
//! - A context's key is never empty.
//! - `attributes` never contains the reserved names `kind`, `key`,
//!   `anonymous`, `_meta`.
//! - Multi-kind contexts have at least one part and no repeated kind.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde_json::Value;

use crate::error::CoreError;

const RESERVED_ATTRIBUTE_NAMES: [&str; 4] = ["kind", "key", "anonymous", "_meta"];

// ============================================================================
// SECTION: Attribute References
// ============================================================================

/// A reference to a context attribute: either a plain top-level name, or a
/// `/`-delimited path into a nested JSON value starting with `/`.
///
/// # Invariants
/// - Path segments are unescaped eagerly (`~1` → `/`, `~0` → `~`) so callers
///   never see raw escape sequences.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeRef {
    /// A single top-level attribute name, e.g. `"email"`.
    Plain(String),
    /// A `/`-delimited path into nested attributes, e.g. `"/address/city"`.
    Path(Vec<String>),
}

impl AttributeRef {
    /// Parses an attribute reference from its wire representation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedAttributeRef`] if a `/`-prefixed
    /// reference contains an empty segment.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        if let Some(rest) = raw.strip_prefix('/') {
            let mut segments = Vec::new();
            for part in rest.split('/') {
                if part.is_empty() {
                    return Err(CoreError::MalformedAttributeRef(raw.to_owned()));
                }
                segments.push(unescape_segment(part));
            }
            Ok(Self::Path(segments))
        } else {
            Ok(Self::Plain(raw.to_owned()))
        }
    }

    /// Returns the top-level attribute name this reference starts from.
    #[must_use]
    pub fn root_name(&self) -> &str {
        match self {
            Self::Plain(name) => name,
            Self::Path(segments) => segments.first().map_or("", String::as_str),
        }
    }

    /// Renders the reference back into its canonical `/`-escaped wire form.
    #[must_use]
    pub fn to_canonical_string(&self) -> String {
        match self {
            Self::Plain(name) => name.clone(),
            Self::Path(segments) => {
                let mut out = String::new();
                for segment in segments {
                    out.push('/');
                    out.push_str(&escape_segment(segment));
                }
                out
            }
        }
    }
}

fn unescape_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

// ============================================================================
// SECTION: Single-Kind Context
// ============================================================================

/// A single-kind evaluation context, e.g. a `user` or `account`.
///
/// # Invariants
/// - `key` is never empty.
/// - `attributes` never contains a reserved name.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleKindContext {
    /// The context kind, e.g. `"user"`.
    pub kind: String,
    /// The context's unique key within its kind.
    pub key: String,
    /// An optional human-readable display name.
    pub name: Option<String>,
    /// Whether this context represents an anonymous (unidentified) subject.
    pub anonymous: bool,
    /// Custom attributes, excluding the reserved built-ins.
    pub attributes: BTreeMap<String, Value>,
    /// Attribute references redacted from outbound events for this context.
    pub private_attributes: Vec<AttributeRef>,
}

impl SingleKindContext {
    /// Builds a single-kind context, validating the key and attribute names.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyContextKey`] if `key` is empty, or
    /// [`CoreError::ReservedAttributeName`] if `attributes` shadows a
    /// built-in field.
    pub fn new(
        kind: impl Into<String>,
        key: impl Into<String>,
        attributes: BTreeMap<String, Value>,
    ) -> Result<Self, CoreError> {
        let key = key.into();
        if key.is_empty() {
            return Err(CoreError::EmptyContextKey);
        }
        for name in attributes.keys() {
            if RESERVED_ATTRIBUTE_NAMES.contains(&name.as_str()) {
                return Err(CoreError::ReservedAttributeName(name.clone()));
            }
        }
        Ok(Self {
            kind: kind.into(),
            key,
            name: None,
            anonymous: false,
            attributes,
            private_attributes: Vec::new(),
        })
    }

    /// Looks up an attribute by reference, special-casing the built-ins that
    /// are not stored in `attributes`.
    #[must_use]
    pub fn get_attribute(&self, attr: &AttributeRef) -> Option<Value> {
        match attr {
            AttributeRef::Plain(name) => self.get_builtin_or_custom(name),
            AttributeRef::Path(segments) => {
                let root = segments.first()?;
                let mut current = self.get_builtin_or_custom(root)?;
                for segment in &segments[1..] {
                    current = current.get(segment)?.clone();
                }
                Some(current)
            }
        }
    }

    fn get_builtin_or_custom(&self, name: &str) -> Option<Value> {
        match name {
            "kind" => Some(Value::String(self.kind.clone())),
            "key" => Some(Value::String(self.key.clone())),
            "anonymous" => Some(Value::Bool(self.anonymous)),
            "name" => self.name.clone().map(Value::String),
            other => self.attributes.get(other).cloned(),
        }
    }
}

fn is_valid_kind_name(kind: &str) -> bool {
    !kind.is_empty()
        && kind.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
}

// ============================================================================
// SECTION: Context
// ============================================================================

/// Either a single-kind context or a non-empty, kind-keyed multi-kind
/// composite.
///
/// # Invariants
/// - `Multi` variants have at least one part and no duplicate kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Context {
    /// A context with exactly one kind.
    Single(SingleKindContext),
    /// A composite context spanning several kinds, sorted by kind.
    Multi(BTreeMap<String, SingleKindContext>),
}

/// A single kind name extracted from a [`Context`], used to scope clause and
/// target lookups.
pub type ContextKind = String;

impl Context {
    /// Builds a single-kind context.
    ///
    /// # Errors
    ///
    /// See [`SingleKindContext::new`].
    pub fn single(
        kind: impl Into<String>,
        key: impl Into<String>,
        attributes: BTreeMap<String, Value>,
    ) -> Result<Self, CoreError> {
        Ok(Self::Single(SingleKindContext::new(kind, key, attributes)?))
    }

    /// Builds a multi-kind context from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyMultiKindContext`] if `parts` is empty,
    /// [`CoreError::InvalidContextKind`] if a kind fails the
    /// `[A-Za-z0-9._-]+` pattern, or [`CoreError::DuplicateContextKind`] if
    /// two parts declare the same kind.
    pub fn multi(parts: Vec<SingleKindContext>) -> Result<Self, CoreError> {
        if parts.is_empty() {
            return Err(CoreError::EmptyMultiKindContext());
        }
        let mut map = BTreeMap::new();
        for part in parts {
            if !is_valid_kind_name(&part.kind) {
                return Err(CoreError::InvalidContextKind(part.kind));
            }
            if map.contains_key(&part.kind) {
                return Err(CoreError::DuplicateContextKind(part.kind));
            }
            map.insert(part.kind.clone(), part);
        }
        Ok(Self::Multi(map))
    }

    /// Returns the single-kind part matching `kind`, or `None` if absent.
    #[must_use]
    pub fn part_for_kind(&self, kind: &str) -> Option<&SingleKindContext> {
        match self {
            Self::Single(ctx) if ctx.kind == kind => Some(ctx),
            Self::Single(_) => None,
            Self::Multi(parts) => parts.get(kind),
        }
    }

    /// Returns every kind present in this context, in sorted order for
    /// multi-kind contexts and a single-element slice for single-kind ones.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        match self {
            Self::Single(ctx) => vec![ctx.kind.as_str()],
            Self::Multi(parts) => parts.keys().map(String::as_str).collect(),
        }
    }

    /// Returns whether every part of this context is anonymous.
    #[must_use]
    pub fn fully_anonymous(&self) -> bool {
        match self {
            Self::Single(ctx) => ctx.anonymous,
            Self::Multi(parts) => parts.values().all(|ctx| ctx.anonymous),
        }
    }

    /// Computes the canonical fully-qualified key used for bucketing and
    /// event de-duplication.
    #[must_use]
    pub fn fully_qualified_key(&self) -> String {
        match self {
            Self::Single(ctx) => ctx.key.clone(),
            Self::Multi(parts) => {
                let mut out = String::new();
                for (index, (kind, ctx)) in parts.iter().enumerate() {
                    if index > 0 {
                        out.push(':');
                    }
                    let _ = write!(out, "{kind}:{}", percent_escape_key(&ctx.key));
                }
                out
            }
        }
    }
}

fn percent_escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for ch in key.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            other => out.push(other),
        }
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "test assertions favor panics over error propagation"
    )]

    use super::*;

    #[test]
    fn single_kind_fully_qualified_key_is_the_key() {
        let ctx = Context::single("user", "alice", BTreeMap::new()).expect("valid context");
        assert_eq!(ctx.fully_qualified_key(), "alice");
    }

    #[test]
    fn multi_kind_key_is_sorted_and_escaped() {
        let user = SingleKindContext::new("user", "a:b", BTreeMap::new()).expect("valid");
        let org = SingleKindContext::new("org", "acme", BTreeMap::new()).expect("valid");
        let ctx = Context::multi(vec![org, user]).expect("valid multi-kind context");
        assert_eq!(ctx.fully_qualified_key(), "org:acme:user:a%3Ab");
    }

    #[test]
    fn rejects_reserved_attribute_names() {
        let mut attrs = BTreeMap::new();
        attrs.insert("kind".to_owned(), Value::String("nope".to_owned()));
        let err = SingleKindContext::new("user", "alice", attrs).unwrap_err();
        assert_eq!(err, CoreError::ReservedAttributeName("kind".to_owned()));
    }

    #[test]
    fn rejects_empty_key() {
        let err = Context::single("user", "", BTreeMap::new()).unwrap_err();
        assert_eq!(err, CoreError::EmptyContextKey);
    }

    #[test]
    fn rejects_duplicate_kind_in_multi_context() {
        let a = SingleKindContext::new("user", "a", BTreeMap::new()).expect("valid");
        let b = SingleKindContext::new("user", "b", BTreeMap::new()).expect("valid");
        let err = Context::multi(vec![a, b]).unwrap_err();
        assert_eq!(err, CoreError::DuplicateContextKind("user".to_owned()));
    }

    #[test]
    fn attribute_path_escapes_round_trip() {
        let attr = AttributeRef::parse("/a~1b/c~0d").expect("valid reference");
        assert_eq!(attr, AttributeRef::Path(vec!["a/b".to_owned(), "c~d".to_owned()]));
        assert_eq!(attr.to_canonical_string(), "/a~1b/c~0d");
    }

    #[test]
    fn nested_attribute_lookup_walks_path() {
        let mut nested = serde_json::Map::new();
        nested.insert("city".to_owned(), Value::String("nyc".to_owned()));
        let mut attrs = BTreeMap::new();
        attrs.insert("address".to_owned(), Value::Object(nested));
        let ctx = SingleKindContext::new("user", "alice", attrs).expect("valid");
        let attr = AttributeRef::parse("/address/city").expect("valid reference");
        assert_eq!(ctx.get_attribute(&attr), Some(Value::String("nyc".to_owned())));
    }
}
