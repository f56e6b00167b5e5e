// crates/flagline-eval/src/segments.rs
// ============================================================================
// Module: Segment Matching
// Description: Decides whether a context is a member of a `Segment`,
//              including unbounded (big) segments and nested segment rules.
// Purpose: Back `ClauseOp::SegmentMatch` and the evaluator's own segment
//          lookups with cycle- and depth-bounded recursion.
// Dependencies: flagline-core
// ============================================================================

//! ## Overview
//! Segment membership is checked in the fixed order the rule language
//! defines: explicit per-key inclusion, then per-kind inclusion lists, then
//! explicit exclusion, then per-kind exclusion lists, then segment rules.
//! Unbounded segments skip the key-set checks entirely and defer to a
//! [`flagline_core::BigSegmentsProvider`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cell::Cell;

use flagline_core::BigSegmentMembership;
use flagline_core::BigSegmentsProvider;
use flagline_core::BigSegmentsStatus;
use flagline_core::Context;
use flagline_core::Segment;
use flagline_core::SegmentContextList;
use flagline_core::SegmentRule;

use crate::bucketing;
use crate::clauses;
use crate::clauses::SegmentMatcher;
use crate::repository::Repository;

/// Walks segment (and, through clause evaluation, nested segment)
/// membership, bounding recursion depth and surfacing big-segment
/// staleness.
pub struct SegmentEvaluator<'a> {
    repository: &'a dyn Repository,
    big_segments: Option<&'a dyn BigSegmentsProvider>,
    context: &'a Context,
    depth: Cell<u32>,
    malformed: Cell<bool>,
    big_segments_status: Cell<Option<BigSegmentsStatus>>,
}

impl<'a> SegmentEvaluator<'a> {
    /// Builds a segment evaluator scoped to one evaluation call.
    #[must_use]
    pub fn new(
        repository: &'a dyn Repository,
        big_segments: Option<&'a dyn BigSegmentsProvider>,
        context: &'a Context,
    ) -> Self {
        Self {
            repository,
            big_segments,
            context,
            depth: Cell::new(0),
            malformed: Cell::new(false),
            big_segments_status: Cell::new(None),
        }
    }

    /// Returns `true` once recursion past [`bucketing::MAX_SEGMENT_RECURSION_DEPTH`]
    /// was detected during this evaluation; the caller should treat the
    /// overall flag evaluation as [`ErrorKind::MalformedFlag`].
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        self.malformed.get()
    }

    /// The weakest big-segment status observed during this evaluation, if
    /// any unbounded segment was consulted.
    #[must_use]
    pub fn big_segments_status(&self) -> Option<BigSegmentsStatus> {
        self.big_segments_status.get()
    }

    /// Returns whether `self.context` is a member of the named segment.
    #[must_use]
    pub fn matches(&self, segment_key: &str) -> bool {
        if self.malformed.get() {
            return false;
        }
        if self.depth.get() >= bucketing::MAX_SEGMENT_RECURSION_DEPTH {
            self.malformed.set(true);
            return false;
        }
        let Some(segment) = self.repository.get_segment(segment_key) else {
            return false;
        };
        self.depth.set(self.depth.get() + 1);
        let result = self.evaluate_segment(&segment);
        self.depth.set(self.depth.get() - 1);
        result
    }

    fn evaluate_segment(&self, segment: &Segment) -> bool {
        if segment.unbounded {
            return self.evaluate_unbounded(segment);
        }
        let Some(key) = self.context.part_for_kind("user").map(|part| part.key.clone()) else {
            return false;
        };
        if segment.excluded.contains(&key) {
            return false;
        }
        if contains_context_list(&segment.excluded_contexts, self.context) {
            return false;
        }
        if segment.included.contains(&key) {
            return true;
        }
        if contains_context_list(&segment.included_contexts, self.context) {
            return true;
        }
        self.matches_any_rule(&segment.rules, segment)
    }

    fn evaluate_unbounded(&self, segment: &Segment) -> bool {
        let kind = segment.unbounded_context_kind.as_deref().unwrap_or("user");
        let Some(part) = self.context.part_for_kind(kind) else {
            return false;
        };
        let Some(provider) = self.big_segments else {
            self.merge_status(BigSegmentsStatus::NotConfigured);
            return false;
        };
        let generation = segment.generation.unwrap_or(0);
        let (membership, status) = provider.query(kind, &part.key, generation);
        self.merge_status(status);
        match membership {
            BigSegmentMembership::Included => true,
            BigSegmentMembership::Excluded => false,
            BigSegmentMembership::Absent => self.matches_any_rule(&segment.rules, segment),
        }
    }

    fn merge_status(&self, incoming: BigSegmentsStatus) {
        let merged = match (self.big_segments_status.get(), incoming) {
            (None, s) => s,
            (Some(BigSegmentsStatus::StoreError), _) | (Some(_), BigSegmentsStatus::StoreError) => {
                BigSegmentsStatus::StoreError
            }
            (Some(BigSegmentsStatus::NotConfigured), _) | (Some(_), BigSegmentsStatus::NotConfigured) => {
                BigSegmentsStatus::NotConfigured
            }
            (Some(BigSegmentsStatus::Stale), _) | (Some(_), BigSegmentsStatus::Stale) => BigSegmentsStatus::Stale,
            (Some(BigSegmentsStatus::Healthy), BigSegmentsStatus::Healthy) => BigSegmentsStatus::Healthy,
        };
        self.big_segments_status.set(Some(merged));
    }

    fn matches_any_rule(&self, rules: &[SegmentRule], segment: &Segment) -> bool {
        rules.iter().any(|rule| self.rule_matches(rule, segment))
    }

    fn rule_matches(&self, rule: &SegmentRule, segment: &Segment) -> bool {
        let all_clauses_match = rule
            .clauses
            .iter()
            .all(|clause| clauses::evaluate_clause(clause, self.context, &mut self.as_segment_matcher()));
        if !all_clauses_match {
            return false;
        }
        let Some(weight) = rule.weight else {
            return true;
        };
        let context_kind = rule.rollout_context_kind.as_deref().unwrap_or("user");
        let bucket_by = rule.bucket_by.as_deref().unwrap_or("key");
        let value = bucketing::resolve_bucketing_value(self.context, context_kind, bucket_by);
        let bucket_value = bucketing::bucket(segment.key.as_str(), &segment.salt, None, &value);
        bucket_value < (f64::from(weight) / 100_000.0)
    }

    fn as_segment_matcher(&self) -> RecursingMatcher<'_, 'a> {
        RecursingMatcher { evaluator: self }
    }
}

fn contains_context_list(lists: &[SegmentContextList], context: &Context) -> bool {
    lists.iter().any(|list| {
        context
            .part_for_kind(&list.context_kind)
            .is_some_and(|part| list.values.contains(&part.key))
    })
}

/// Bridges [`SegmentEvaluator`] back into [`clauses::evaluate_clause`]'s
/// `segmentMatch` callback without exposing interior mutability to callers.
struct RecursingMatcher<'b, 'a> {
    evaluator: &'b SegmentEvaluator<'a>,
}

impl SegmentMatcher for RecursingMatcher<'_, '_> {
    fn segment_matches(&mut self, segment_key: &str) -> bool {
        self.evaluator.matches(segment_key)
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "test assertions favor panics over error propagation"
    )]

    use std::collections::BTreeMap;
    use std::collections::BTreeSet as Set;

    use flagline_core::Flag;
    use flagline_core::SegmentKey;

    use super::*;

    struct MapRepository {
        segments: BTreeMap<String, Segment>,
    }

    impl Repository for MapRepository {
        fn get_flag(&self, _key: &str) -> Option<Flag> {
            None
        }

        fn get_segment(&self, key: &str) -> Option<Segment> {
            self.segments.get(key).cloned()
        }
    }

    fn bare_segment(key: &str) -> Segment {
        Segment {
            key: SegmentKey::new(key),
            version: 1,
            included: Set::new(),
            excluded: Set::new(),
            included_contexts: Vec::new(),
            excluded_contexts: Vec::new(),
            rules: Vec::new(),
            salt: "salt".to_owned(),
            unbounded: false,
            unbounded_context_kind: None,
            generation: None,
        }
    }

    #[test]
    fn explicit_inclusion_wins() {
        let mut segment = bare_segment("beta-users");
        segment.included.insert("alice".to_owned());
        let mut segments = BTreeMap::new();
        segments.insert("beta-users".to_owned(), segment);
        let repo = MapRepository { segments };
        let ctx = Context::single("user", "alice", BTreeMap::new()).expect("valid");
        let eval = SegmentEvaluator::new(&repo, None, &ctx);
        assert!(eval.matches("beta-users"));
    }

    #[test]
    fn explicit_exclusion_beats_explicit_inclusion() {
        let mut segment = bare_segment("beta-users");
        segment.included.insert("alice".to_owned());
        segment.excluded.insert("alice".to_owned());
        let mut segments = BTreeMap::new();
        segments.insert("beta-users".to_owned(), segment);
        let repo = MapRepository { segments };
        let ctx = Context::single("user", "alice", BTreeMap::new()).expect("valid");
        let eval = SegmentEvaluator::new(&repo, None, &ctx);
        assert!(!eval.matches("beta-users"));
    }

    #[test]
    fn explicit_exclusion_beats_rules() {
        let mut segment = bare_segment("beta-users");
        segment.excluded.insert("bob".to_owned());
        let mut segments = BTreeMap::new();
        segments.insert("beta-users".to_owned(), segment);
        let repo = MapRepository { segments };
        let ctx = Context::single("user", "bob", BTreeMap::new()).expect("valid");
        let eval = SegmentEvaluator::new(&repo, None, &ctx);
        assert!(!eval.matches("beta-users"));
    }

    #[test]
    fn recursion_past_depth_limit_is_malformed() {
        let mut segments = BTreeMap::new();
        for depth in 0..=bucketing::MAX_SEGMENT_RECURSION_DEPTH {
            let mut segment = bare_segment(&format!("seg-{depth}"));
            segment.rules.push(SegmentRule {
                id: "r".to_owned(),
                clauses: vec![flagline_core::Clause {
                    context_kind: "user".to_owned(),
                    attribute: "segmentMatch".to_owned(),
                    op: flagline_core::ClauseOp::SegmentMatch,
                    values: vec![serde_json::Value::String(format!("seg-{}", depth + 1))],
                    negate: false,
                }],
                weight: None,
                bucket_by: None,
                rollout_context_kind: None,
            });
            segments.insert(format!("seg-{depth}"), segment);
        }
        let repo = MapRepository { segments };
        let ctx = Context::single("user", "alice", BTreeMap::new()).expect("valid");
        let eval = SegmentEvaluator::new(&repo, None, &ctx);
        assert!(!eval.matches("seg-0"));
        assert!(eval.is_malformed());
    }
}
