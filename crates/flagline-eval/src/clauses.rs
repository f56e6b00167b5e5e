// crates/flagline-eval/src/clauses.rs
// ============================================================================
// Module: Clause Matching
// Description: The operator table a single `Clause` is evaluated against,
//              plus attribute resolution and negation.
// Purpose: Decide whether one clause matches a context, fail-closed on any
//          type mismatch or unparsable literal.
// Dependencies: flagline-core, bigdecimal, regex, semver, time
// ============================================================================

//! ## Overview
//! Every comparison first collapses to a tri-state outcome (`True`/`False`/
//! `Unknown`) the way the evaluator's numeric/date/semver comparisons do.
//! `Unknown` always means "non-match": a missing attribute, a type
//! mismatch, or an unparsable literal never produces an error here, only a
//! non-match, which is what the design calls fail-closed matching.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use flagline_core::AttributeRef;
use flagline_core::Clause;
use flagline_core::ClauseOp;
use flagline_core::Context;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Tri-State
// ============================================================================

/// The outcome of comparing one value against one literal, before negation
/// and before array-element disjunction are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriState {
    /// The comparison held.
    True,
    /// The comparison did not hold.
    False,
    /// The comparison could not be evaluated (type mismatch, unparsable
    /// literal, missing attribute); always treated as non-match.
    Unknown,
}

impl TriState {
    /// Collapses to a boolean, treating `Unknown` as `false`.
    #[must_use]
    pub const fn matched(self) -> bool {
        matches!(self, Self::True)
    }
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

// ============================================================================
// SECTION: Clause Evaluation
// ============================================================================

/// A resolver for `segmentMatch` clauses, letting `evaluate_clause` call
/// back into segment matching without creating a module cycle.
pub trait SegmentMatcher {
    /// Returns whether the named segment matches, from the caller's
    /// perspective (recursion depth, staleness, etc. are the caller's
    /// concern).
    fn segment_matches(&mut self, segment_key: &str) -> bool;
}

/// Evaluates a single clause against a context, applying negation.
///
/// `segment_matcher` is consulted only for `ClauseOp::SegmentMatch`; other
/// operators ignore it.
pub fn evaluate_clause(
    clause: &Clause,
    context: &Context,
    segment_matcher: &mut dyn SegmentMatcher,
) -> bool {
    let raw_matched = if clause.op == ClauseOp::SegmentMatch {
        clause.values.iter().any(|value| {
            value.as_str().is_some_and(|segment_key| segment_matcher.segment_matches(segment_key))
        })
    } else {
        matches_non_segment_clause(clause, context)
    };
    if clause.negate {
        !raw_matched
    } else {
        raw_matched
    }
}

fn matches_non_segment_clause(clause: &Clause, context: &Context) -> bool {
    let Some(part) = context.part_for_kind(&clause.context_kind) else {
        return false;
    };
    let Ok(attr) = AttributeRef::parse(&clause.attribute) else {
        return false;
    };
    let resolved = if attr.root_name() == "kind" {
        Some(Value::Array(context.kinds().into_iter().map(|k| Value::String(k.to_owned())).collect()))
    } else {
        part.get_attribute(&attr)
    };
    let Some(resolved) = resolved else {
        return false;
    };

    match resolved {
        Value::Array(items) => items.iter().any(|item| evaluate_against_literals(clause.op, item, &clause.values).matched()),
        scalar => evaluate_against_literals(clause.op, &scalar, &clause.values).matched(),
    }
}

fn evaluate_against_literals(op: ClauseOp, attribute_value: &Value, literals: &[Value]) -> TriState {
    if matches!(op, ClauseOp::In) {
        return TriState::from(literals.contains(attribute_value));
    }
    for literal in literals {
        if evaluate_scalar(op, attribute_value, literal).matched() {
            return TriState::True;
        }
    }
    TriState::False
}

fn evaluate_scalar(op: ClauseOp, attribute_value: &Value, literal: &Value) -> TriState {
    match op {
        ClauseOp::In => TriState::from(attribute_value == literal),
        ClauseOp::Contains | ClauseOp::StartsWith | ClauseOp::EndsWith | ClauseOp::Matches => {
            evaluate_string_op(op, attribute_value, literal)
        }
        ClauseOp::LessThan | ClauseOp::LessThanOrEqual | ClauseOp::GreaterThan | ClauseOp::GreaterThanOrEqual => {
            evaluate_numeric_op(op, attribute_value, literal)
        }
        ClauseOp::Before | ClauseOp::After => evaluate_date_op(op, attribute_value, literal),
        ClauseOp::SemVerEqual | ClauseOp::SemVerLessThan | ClauseOp::SemVerGreaterThan => {
            evaluate_semver_op(op, attribute_value, literal)
        }
        ClauseOp::SegmentMatch => TriState::Unknown,
    }
}

fn evaluate_string_op(op: ClauseOp, attribute_value: &Value, literal: &Value) -> TriState {
    let (Value::String(haystack), Value::String(needle)) = (attribute_value, literal) else {
        return TriState::Unknown;
    };
    let result = match op {
        ClauseOp::Contains => haystack.contains(needle.as_str()),
        ClauseOp::StartsWith => haystack.starts_with(needle.as_str()),
        ClauseOp::EndsWith => haystack.ends_with(needle.as_str()),
        ClauseOp::Matches => regex::Regex::new(needle).is_ok_and(|re| re.is_match(haystack)),
        _ => return TriState::Unknown,
    };
    TriState::from(result)
}

fn evaluate_numeric_op(op: ClauseOp, attribute_value: &Value, literal: &Value) -> TriState {
    let (Some(left), Some(right)) = (decimal_from_json(attribute_value), decimal_from_json(literal)) else {
        return TriState::Unknown;
    };
    let ordering = left.cmp(&right);
    let result = match op {
        ClauseOp::LessThan => ordering == Ordering::Less,
        ClauseOp::LessThanOrEqual => ordering != Ordering::Greater,
        ClauseOp::GreaterThan => ordering == Ordering::Greater,
        ClauseOp::GreaterThanOrEqual => ordering != Ordering::Less,
        _ => return TriState::Unknown,
    };
    TriState::from(result)
}

fn decimal_from_json(value: &Value) -> Option<BigDecimal> {
    let number = value.as_number()?;
    BigDecimal::from_str(&number.to_string()).ok()
}

fn evaluate_date_op(op: ClauseOp, attribute_value: &Value, literal: &Value) -> TriState {
    let (Some(left), Some(right)) = (parse_moment(attribute_value), parse_moment(literal)) else {
        return TriState::Unknown;
    };
    let ordering = left.cmp(&right);
    let result = match op {
        ClauseOp::Before => ordering == Ordering::Less,
        ClauseOp::After => ordering == Ordering::Greater,
        _ => return TriState::Unknown,
    };
    TriState::from(result)
}

fn parse_moment(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::String(s) => OffsetDateTime::parse(s, &Rfc3339).ok(),
        Value::Number(n) => {
            let millis = n.as_i64()?;
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
        }
        _ => None,
    }
}

fn evaluate_semver_op(op: ClauseOp, attribute_value: &Value, literal: &Value) -> TriState {
    let (Value::String(left_raw), Value::String(right_raw)) = (attribute_value, literal) else {
        return TriState::Unknown;
    };
    let (Some(left), Some(right)) = (parse_loose_semver(left_raw), parse_loose_semver(right_raw)) else {
        return TriState::Unknown;
    };
    let ordering = left.cmp(&right);
    let result = match op {
        ClauseOp::SemVerEqual => ordering == Ordering::Equal,
        ClauseOp::SemVerLessThan => ordering == Ordering::Less,
        ClauseOp::SemVerGreaterThan => ordering == Ordering::Greater,
        _ => return TriState::Unknown,
    };
    TriState::from(result)
}

fn parse_loose_semver(raw: &str) -> Option<semver::Version> {
    semver::Version::parse(raw).ok().or_else(|| {
        let mut parts = raw.splitn(3, '.');
        let major: u64 = parts.next()?.parse().ok()?;
        let minor: u64 = parts.next().unwrap_or("0").parse().unwrap_or(0);
        let patch: u64 = parts.next().unwrap_or("0").parse().unwrap_or(0);
        Some(semver::Version::new(major, minor, patch))
    })
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "test assertions favor panics over error propagation"
    )]

    use std::collections::BTreeMap;

    use super::*;

    struct NoSegments;
    impl SegmentMatcher for NoSegments {
        fn segment_matches(&mut self, _segment_key: &str) -> bool {
            false
        }
    }

    fn clause(op: ClauseOp, attribute: &str, values: Vec<Value>) -> Clause {
        Clause { context_kind: "user".to_owned(), attribute: attribute.to_owned(), op, values, negate: false }
    }

    fn ctx_with(attr: &str, value: Value) -> Context {
        let mut attrs = BTreeMap::new();
        attrs.insert(attr.to_owned(), value);
        Context::single("user", "a", attrs).expect("valid")
    }

    #[test]
    fn in_operator_matches_exact_value() {
        let ctx = ctx_with("plan", Value::String("gold".to_owned()));
        let c = clause(ClauseOp::In, "plan", vec![Value::String("gold".to_owned())]);
        assert!(evaluate_clause(&c, &ctx, &mut NoSegments));
    }

    #[test]
    fn numeric_mismatch_type_is_non_match_not_error() {
        let ctx = ctx_with("age", Value::String("not-a-number".to_owned()));
        let c = clause(ClauseOp::GreaterThan, "age", vec![Value::from(18)]);
        assert!(!evaluate_clause(&c, &ctx, &mut NoSegments));
    }

    #[test]
    fn negate_inverts_match() {
        let ctx = ctx_with("plan", Value::String("gold".to_owned()));
        let mut c = clause(ClauseOp::In, "plan", vec![Value::String("gold".to_owned())]);
        c.negate = true;
        assert!(!evaluate_clause(&c, &ctx, &mut NoSegments));
    }

    #[test]
    fn array_attribute_matches_if_any_element_matches() {
        let ctx = ctx_with(
            "roles",
            Value::Array(vec![Value::String("viewer".to_owned()), Value::String("admin".to_owned())]),
        );
        let c = clause(ClauseOp::In, "roles", vec![Value::String("admin".to_owned())]);
        assert!(evaluate_clause(&c, &ctx, &mut NoSegments));
    }

    #[test]
    fn semver_loose_parsing_fills_missing_components() {
        let ctx = ctx_with("app_version", Value::String("2.1".to_owned()));
        let c = clause(ClauseOp::SemVerGreaterThan, "app_version", vec![Value::String("2.0.0".to_owned())]);
        assert!(evaluate_clause(&c, &ctx, &mut NoSegments));
    }

    #[test]
    fn kind_attribute_resolves_to_context_kinds() {
        let ctx = Context::single("org", "acme", BTreeMap::new()).expect("valid");
        let c = Clause {
            context_kind: "org".to_owned(),
            attribute: "kind".to_owned(),
            op: ClauseOp::In,
            values: vec![Value::String("org".to_owned())],
            negate: false,
        };
        assert!(evaluate_clause(&c, &ctx, &mut NoSegments));
    }
}
