// crates/flagline-eval/src/evaluator.rs
// ============================================================================
// Module: Evaluator
// Description: The top-level decision procedure: off-check, prerequisites,
//              targets, rules, fallthrough.
// Purpose: Turn `(flag, context, default)` into a served value and a reason,
//          recursing into prerequisites with cycle detection.
// Dependencies: flagline-core, crate::bucketing, crate::clauses, crate::segments
// ============================================================================

//! ## Overview
//! `evaluate` never touches the network or blocks; every piece of state it
//! needs comes in through [`Repository`] and, for unbounded segments,
//! [`flagline_core::BigSegmentsProvider`]. Prerequisite recursion tracks
//! visited flag keys so a cyclic prerequisite graph fails closed instead of
//! overflowing the stack.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;

use flagline_core::BigSegmentsProvider;
use flagline_core::BigSegmentsStatus;
use flagline_core::Context;
use flagline_core::Flag;
use flagline_core::FlagKey;
use flagline_core::Rollout;
use flagline_core::RolloutKind;
use flagline_core::VariationOrRollout;
use serde_json::Value;

use crate::bucketing;
use crate::clauses;
use crate::clauses::SegmentMatcher;
use crate::reason::ErrorKind;
use crate::reason::Reason;
use crate::repository::Repository;
use crate::segments::SegmentEvaluator;

/// The outcome of evaluating one flag against one context.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalResult {
    /// The served value (one of `flag.variations`, or the caller's default).
    pub value: Value,
    /// The index into `flag.variations` that was served, or `None` when the
    /// caller's default was served instead (off with no `off_variation`,
    /// or an error).
    pub variation_index: Option<usize>,
    /// Why this value was served.
    pub reason: Reason,
    /// One entry per prerequisite flag evaluated while resolving this
    /// result, in evaluation order, for the event pipeline to summarize.
    pub prerequisite_events: Vec<PrerequisiteEvaluationEvent>,
    /// The weakest big-segment status observed, if any unbounded segment
    /// was consulted while matching rules or prerequisites.
    pub big_segments_status: Option<BigSegmentsStatus>,
}

/// One prerequisite flag's evaluation outcome, recorded so the event
/// pipeline can summarize it as its own evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct PrerequisiteEvaluationEvent {
    /// The prerequisite flag's key.
    pub flag_key: FlagKey,
    /// The prerequisite flag's version at evaluation time.
    pub flag_version: i64,
    /// The variation served, or `None` if the prerequisite itself errored.
    pub variation_index: Option<usize>,
    /// The value served.
    pub value: Value,
    /// Why that value was served.
    pub reason: Reason,
}

/// Evaluates `flag` against `context`, returning the served value and the
/// reason it was served. `default` is served whenever the rule language
/// cannot determine a variation (flag off with no `off_variation`,
/// malformed data, missing context).
#[must_use]
pub fn evaluate(
    flag: &Flag,
    context: &Context,
    repository: &dyn Repository,
    big_segments: Option<&dyn BigSegmentsProvider>,
    default: &Value,
) -> EvalResult {
    let mut visited = HashSet::new();
    visited.insert(flag.key.as_str().to_owned());
    evaluate_internal(flag, context, repository, big_segments, default, &mut visited)
}

fn evaluate_internal(
    flag: &Flag,
    context: &Context,
    repository: &dyn Repository,
    big_segments: Option<&dyn BigSegmentsProvider>,
    default: &Value,
    visited: &mut HashSet<String>,
) -> EvalResult {
    if !flag.on {
        return off_result(flag, default);
    }

    let mut prerequisite_events = Vec::new();
    let mut big_segments_status = None;
    match evaluate_prerequisites(flag, context, repository, big_segments, visited, &mut prerequisite_events, &mut big_segments_status) {
        Some(PrerequisiteOutcome::Cycle) => {
            let mut result = error_result(ErrorKind::MalformedFlag, default);
            result.prerequisite_events = prerequisite_events;
            result.big_segments_status = big_segments_status;
            return result;
        }
        Some(PrerequisiteOutcome::Failed(failed)) => {
            let mut result = off_result(flag, default);
            result.reason = Reason::PrerequisiteFailed { prerequisite_key: failed };
            result.prerequisite_events = prerequisite_events;
            result.big_segments_status = big_segments_status;
            return result;
        }
        None => {}
    }

    if let Some(context_part_key) = target_match(flag, context) {
        let mut result = variation_result(flag, context_part_key, Reason::TargetMatch, default);
        result.prerequisite_events = prerequisite_events;
        result.big_segments_status = big_segments_status;
        return result;
    }

    let segment_eval = SegmentEvaluator::new(repository, big_segments, context);
    for (rule_index, rule) in flag.rules.iter().enumerate() {
        let all_match = rule
            .clauses
            .iter()
            .all(|clause| clauses::evaluate_clause(clause, context, &mut AsMatcher(&segment_eval)));
        if !all_match {
            continue;
        }
        if segment_eval.is_malformed() {
            let mut result = error_result(ErrorKind::MalformedFlag, default);
            result.prerequisite_events = prerequisite_events;
            result.big_segments_status = merge_optional(big_segments_status, segment_eval.big_segments_status());
            return result;
        }
        let (variation_index, in_experiment) =
            resolve_variation_or_rollout(&rule.variation_or_rollout, flag, context);
        let reason = Reason::RuleMatch { rule_index, rule_id: rule.id.clone(), in_experiment };
        let mut result = finish(flag, variation_index, reason, default);
        result.prerequisite_events = prerequisite_events;
        result.big_segments_status = merge_optional(big_segments_status, segment_eval.big_segments_status());
        return result;
    }
    if segment_eval.is_malformed() {
        let mut result = error_result(ErrorKind::MalformedFlag, default);
        result.prerequisite_events = prerequisite_events;
        result.big_segments_status = merge_optional(big_segments_status, segment_eval.big_segments_status());
        return result;
    }

    let (variation_index, in_experiment) = resolve_variation_or_rollout(&flag.fallthrough, flag, context);
    let mut result = finish(flag, variation_index, Reason::Fallthrough { in_experiment }, default);
    result.prerequisite_events = prerequisite_events;
    result.big_segments_status = merge_optional(big_segments_status, segment_eval.big_segments_status());
    result
}

fn merge_optional(a: Option<BigSegmentsStatus>, b: Option<BigSegmentsStatus>) -> Option<BigSegmentsStatus> {
    match (a, b) {
        (None, x) | (x, None) => x,
        (Some(_), Some(BigSegmentsStatus::StoreError)) | (Some(BigSegmentsStatus::StoreError), Some(_)) => {
            Some(BigSegmentsStatus::StoreError)
        }
        (Some(_), Some(BigSegmentsStatus::NotConfigured)) | (Some(BigSegmentsStatus::NotConfigured), Some(_)) => {
            Some(BigSegmentsStatus::NotConfigured)
        }
        (Some(_), Some(BigSegmentsStatus::Stale)) | (Some(BigSegmentsStatus::Stale), Some(_)) => {
            Some(BigSegmentsStatus::Stale)
        }
        (Some(BigSegmentsStatus::Healthy), Some(BigSegmentsStatus::Healthy)) => Some(BigSegmentsStatus::Healthy),
    }
}

/// Bridges [`SegmentEvaluator`]'s shared-reference API into the
/// `&mut dyn SegmentMatcher` that [`clauses::evaluate_clause`] expects.
struct AsMatcher<'a, 'b>(&'a SegmentEvaluator<'b>);

impl SegmentMatcher for AsMatcher<'_, '_> {
    fn segment_matches(&mut self, segment_key: &str) -> bool {
        self.0.matches(segment_key)
    }
}

/// Why prerequisite resolution stopped short of every prerequisite being
/// satisfied.
enum PrerequisiteOutcome {
    /// A prerequisite is off, missing, or didn't land on the required
    /// variation.
    Failed(FlagKey),
    /// A prerequisite chain refers back to a flag already being resolved.
    Cycle,
}

#[allow(clippy::too_many_arguments, reason = "prerequisite recursion threads shared accumulator state that would otherwise need a dedicated context struct for one call site")]
fn evaluate_prerequisites(
    flag: &Flag,
    context: &Context,
    repository: &dyn Repository,
    big_segments: Option<&dyn BigSegmentsProvider>,
    visited: &mut HashSet<String>,
    events: &mut Vec<PrerequisiteEvaluationEvent>,
    big_segments_status: &mut Option<BigSegmentsStatus>,
) -> Option<PrerequisiteOutcome> {
    for prerequisite in &flag.prerequisites {
        let key = prerequisite.key.as_str();
        if !visited.insert(key.to_owned()) {
            return Some(PrerequisiteOutcome::Cycle);
        }
        let Some(prereq_flag) = repository.get_flag(key) else {
            return Some(PrerequisiteOutcome::Failed(prerequisite.key.clone()));
        };
        let prereq_default = Value::Null;
        let prereq_result =
            evaluate_internal(&prereq_flag, context, repository, big_segments, &prereq_default, visited);
        visited.remove(key);

        events.push(PrerequisiteEvaluationEvent {
            flag_key: prereq_flag.key.clone(),
            flag_version: prereq_flag.version,
            variation_index: prereq_result.variation_index,
            value: prereq_result.value.clone(),
            reason: prereq_result.reason.clone(),
        });
        *big_segments_status = merge_optional(*big_segments_status, prereq_result.big_segments_status);
        events.extend(prereq_result.prerequisite_events);

        let satisfied = prereq_flag.on
            && prereq_result.variation_index == Some(prerequisite.variation);
        if !satisfied {
            return Some(PrerequisiteOutcome::Failed(prerequisite.key.clone()));
        }
    }
    None
}

fn target_match(flag: &Flag, context: &Context) -> Option<usize> {
    for context_target in &flag.context_targets {
        if let Some(part) = context.part_for_kind(&context_target.context_kind) {
            if context_target.values.contains(&part.key) {
                return Some(context_target.variation);
            }
        }
    }
    let user_key = context.part_for_kind("user").map(|part| part.key.as_str());
    for target in &flag.targets {
        if user_key.is_some_and(|key| target.values.contains(key)) {
            return Some(target.variation);
        }
    }
    None
}

fn resolve_variation_or_rollout(vor: &VariationOrRollout, flag: &Flag, context: &Context) -> (Option<usize>, bool) {
    match vor {
        VariationOrRollout::Variation { variation } => (Some(*variation), false),
        VariationOrRollout::Rollout { rollout } => resolve_rollout(rollout, flag, context),
    }
}

fn resolve_rollout(rollout: &Rollout, flag: &Flag, context: &Context) -> (Option<usize>, bool) {
    let context_kind = rollout.context_kind.as_deref().unwrap_or("user");
    let bucket_by = rollout.bucket_by.as_deref().unwrap_or("key");
    let value = bucketing::resolve_bucketing_value(context, context_kind, bucket_by);
    let bucket_value = bucketing::bucket(flag.key.as_str(), &flag.salt, rollout.seed, &value);
    let Some(picked) = bucketing::pick_weighted_variation(&rollout.variations, bucket_value) else {
        return (None, false);
    };
    let in_experiment = rollout.kind == RolloutKind::Experiment && !picked.untracked;
    (Some(picked.variation), in_experiment)
}

fn off_result(flag: &Flag, default: &Value) -> EvalResult {
    finish(flag, flag.off_variation, Reason::Off, default)
}

fn variation_result(flag: &Flag, variation_index: usize, reason: Reason, default: &Value) -> EvalResult {
    finish(flag, Some(variation_index), reason, default)
}

fn error_result(kind: ErrorKind, default: &Value) -> EvalResult {
    EvalResult {
        value: default.clone(),
        variation_index: None,
        reason: Reason::Error { kind },
        prerequisite_events: Vec::new(),
        big_segments_status: None,
    }
}

fn finish(flag: &Flag, variation_index: Option<usize>, reason: Reason, default: &Value) -> EvalResult {
    let Some(index) = variation_index else {
        return EvalResult {
            value: default.clone(),
            variation_index: None,
            reason,
            prerequisite_events: Vec::new(),
            big_segments_status: None,
        };
    };
    flag.variations.get(index).map_or_else(
        || error_result(ErrorKind::MalformedFlag, default),
        |value| EvalResult {
            value: value.clone(),
            variation_index: Some(index),
            reason,
            prerequisite_events: Vec::new(),
            big_segments_status: None,
        },
    )
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "test assertions favor panics over error propagation"
    )]

    use std::collections::BTreeMap;
    use std::collections::BTreeSet;

    use flagline_core::FlagKey;
    use flagline_core::Prerequisite;
    use flagline_core::Segment;
    use flagline_core::Target;

    use super::*;

    struct MapRepository {
        flags: BTreeMap<String, Flag>,
    }

    impl Repository for MapRepository {
        fn get_flag(&self, key: &str) -> Option<Flag> {
            self.flags.get(key).cloned()
        }

        fn get_segment(&self, _key: &str) -> Option<Segment> {
            None
        }
    }

    fn bare_flag(key: &str, variations: Vec<Value>) -> Flag {
        Flag {
            key: FlagKey::new(key),
            version: 1,
            on: true,
            variations,
            off_variation: None,
            fallthrough: VariationOrRollout::Variation { variation: 0 },
            targets: Vec::new(),
            context_targets: Vec::new(),
            rules: Vec::new(),
            prerequisites: Vec::new(),
            salt: "salt".to_owned(),
            track_events: false,
            track_events_fallthrough: false,
            debug_events_until_date: None,
            client_side_availability: flagline_core::ClientSideAvailability::default(),
            sampling_ratio: None,
            exclude_from_summaries: false,
            migration: None,
        }
    }

    #[test]
    fn off_flag_serves_off_variation() {
        let mut flag = bare_flag("f", vec![Value::Bool(true), Value::Bool(false)]);
        flag.on = false;
        flag.off_variation = Some(1);
        let repo = MapRepository { flags: BTreeMap::new() };
        let ctx = Context::single("user", "u1", BTreeMap::new()).expect("valid");
        let result = evaluate(&flag, &ctx, &repo, None, &Value::Null);
        assert_eq!(result.value, Value::Bool(false));
        assert_eq!(result.reason, Reason::Off);
    }

    #[test]
    fn plain_target_wins_over_fallthrough() {
        let mut flag = bare_flag("f", vec![Value::from(0), Value::from(1)]);
        flag.targets.push(Target { variation: 1, values: BTreeSet::from(["u1".to_owned()]) });
        let repo = MapRepository { flags: BTreeMap::new() };
        let ctx = Context::single("user", "u1", BTreeMap::new()).expect("valid");
        let result = evaluate(&flag, &ctx, &repo, None, &Value::Null);
        assert_eq!(result.value, Value::from(1));
        assert_eq!(result.reason, Reason::TargetMatch);
    }

    #[test]
    fn fallthrough_serves_when_nothing_else_matches() {
        let flag = bare_flag("f", vec![Value::from(0), Value::from(1)]);
        let repo = MapRepository { flags: BTreeMap::new() };
        let ctx = Context::single("user", "u1", BTreeMap::new()).expect("valid");
        let result = evaluate(&flag, &ctx, &repo, None, &Value::Null);
        assert_eq!(result.value, Value::from(0));
        assert_eq!(result.reason, Reason::Fallthrough { in_experiment: false });
    }

    #[test]
    fn failed_prerequisite_short_circuits_to_off_behavior() {
        let mut dependent = bare_flag("dependent", vec![Value::from("a"), Value::from("b")]);
        dependent.prerequisites.push(Prerequisite { key: FlagKey::new("base"), variation: 0 });
        let mut base = bare_flag("base", vec![Value::from(false), Value::from(true)]);
        base.on = false;
        base.off_variation = Some(1);

        let mut flags = BTreeMap::new();
        flags.insert("base".to_owned(), base);
        let repo = MapRepository { flags };
        let ctx = Context::single("user", "u1", BTreeMap::new()).expect("valid");
        let result = evaluate(&dependent, &ctx, &repo, None, &Value::from("default"));
        assert_eq!(result.value, Value::from("default"));
        assert!(matches!(result.reason, Reason::PrerequisiteFailed { .. }));
        assert_eq!(result.prerequisite_events.len(), 1);
    }

    #[test]
    fn prerequisite_cycle_is_malformed_not_a_stack_overflow() {
        let mut a = bare_flag("a", vec![Value::from(0)]);
        a.prerequisites.push(Prerequisite { key: FlagKey::new("b"), variation: 0 });
        let mut b = bare_flag("b", vec![Value::from(0)]);
        b.prerequisites.push(Prerequisite { key: FlagKey::new("a"), variation: 0 });

        let mut flags = BTreeMap::new();
        flags.insert("a".to_owned(), a.clone());
        flags.insert("b".to_owned(), b);
        let repo = MapRepository { flags };
        let ctx = Context::single("user", "u1", BTreeMap::new()).expect("valid");
        let result = evaluate(&a, &ctx, &repo, None, &Value::from("default"));
        assert!(matches!(result.reason, Reason::Error { kind: ErrorKind::MalformedFlag }));
    }
}
