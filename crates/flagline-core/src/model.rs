// crates/flagline-core/src/model.rs
// ============================================================================
// Module: Flag and Segment Data Model
// Description: The rule language types the evaluator walks: flags, segments,
//              rules, clauses, and variation/rollout selection.
// Purpose: Give the data source, data store, and evaluator one shared,
//          serde-friendly representation of replicated control-plane data.
// Dependencies: crate::identifiers, serde, serde_json
// ============================================================================

//! ## Overview
//! These types mirror §3 of the design document field-for-field. They carry
//! no behavior beyond (de)serialization; the decision procedure that walks
//! them lives in `flagline-eval`, which depends on this crate but not the
//! reverse.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::identifiers::FlagKey;
use crate::identifiers::SegmentKey;

// ============================================================================
// SECTION: Flags
// ============================================================================

/// A feature flag as replicated from the control plane.
///
/// # Invariants
/// - `variations` has at least one entry.
/// - `version` increases monotonically across updates to the same `key`
///   (enforced by the data store, not by this type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    /// The flag's unique key.
    pub key: FlagKey,
    /// Monotonically increasing version assigned by the control plane.
    pub version: i64,
    /// Whether the flag is serving rules at all.
    pub on: bool,
    /// The ordered list of variation values a flag can serve.
    pub variations: Vec<Value>,
    /// The variation served when `on` is false, or `None` to serve the
    /// evaluation default.
    pub off_variation: Option<usize>,
    /// The variation or rollout served when no target or rule matches.
    pub fallthrough: VariationOrRollout,
    /// Individual-context targets, keyed by variation.
    #[serde(default)]
    pub targets: Vec<Target>,
    /// Context-kind-scoped targets, evaluated before `targets`.
    #[serde(default)]
    pub context_targets: Vec<ContextTarget>,
    /// Ordered targeting rules.
    #[serde(default)]
    pub rules: Vec<FlagRule>,
    /// Other flags that must evaluate to a specific variation for this flag
    /// to be considered on.
    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,
    /// Per-flag salt mixed into the bucketing hash.
    pub salt: String,
    /// Whether every evaluation of this flag should emit a full feature
    /// event in addition to the summary counter.
    #[serde(default)]
    pub track_events: bool,
    /// Whether fallthrough evaluations specifically should emit a full
    /// feature event.
    #[serde(default)]
    pub track_events_fallthrough: bool,
    /// Epoch-millisecond deadline until which debug events are emitted.
    #[serde(default)]
    pub debug_events_until_date: Option<i64>,
    /// Whether this flag may be evaluated by client-side SDKs.
    #[serde(default)]
    pub client_side_availability: ClientSideAvailability,
    /// Denominator controlling what fraction of evaluations emit an event.
    #[serde(default)]
    pub sampling_ratio: Option<u32>,
    /// Whether evaluations of this flag are excluded from summary counters.
    #[serde(default)]
    pub exclude_from_summaries: bool,
    /// Migration-stage metadata, present only for migration flags.
    #[serde(default)]
    pub migration: Option<MigrationSettings>,
}

/// Client-side exposure flags for a [`Flag`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSideAvailability {
    /// Whether the flag is usable from client-side JavaScript SDKs.
    #[serde(default)]
    pub using_environment_id: bool,
    /// Whether the flag is usable from mobile SDKs.
    #[serde(default)]
    pub using_mobile_key: bool,
}

/// Migration-stage sampling settings for a migration flag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MigrationSettings {
    /// Fraction (of 100000) of reads/writes that perform the consistency
    /// check between old and new migration paths.
    #[serde(default)]
    pub check_ratio: Option<u32>,
}

/// An individual-context target: a list of context keys that should serve a
/// specific variation, scoped to the default (`user`) context kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// The variation index served to every context key listed.
    pub variation: usize,
    /// The context keys targeted.
    pub values: BTreeSet<String>,
}

/// A [`Target`] scoped to a specific context kind, evaluated before plain
/// `targets`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextTarget {
    /// The context kind this target applies to.
    pub context_kind: String,
    /// The variation index served to every context key listed.
    pub variation: usize,
    /// The context keys targeted, within `context_kind`.
    pub values: BTreeSet<String>,
}

/// A reference to another flag that must serve a specific variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prerequisite {
    /// The prerequisite flag's key.
    pub key: FlagKey,
    /// The variation index the prerequisite must serve.
    pub variation: usize,
}

/// A single targeting rule on a [`Flag`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagRule {
    /// A stable identifier for this rule, used in the `RULE_MATCH` reason.
    pub id: String,
    /// Every clause must match for the rule to match.
    pub clauses: Vec<Clause>,
    /// Whether a match on this rule should emit a full feature event.
    #[serde(default)]
    pub track_events: bool,
    /// The variation or rollout served when this rule matches.
    pub variation_or_rollout: VariationOrRollout,
}

// ============================================================================
// SECTION: Segments
// ============================================================================

/// A reusable, named set of contexts.
///
/// # Invariants
/// - `version` increases monotonically across updates to the same `key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// The segment's unique key.
    pub key: SegmentKey,
    /// Monotonically increasing version assigned by the control plane.
    pub version: i64,
    /// Context keys (of the default kind) always included.
    #[serde(default)]
    pub included: BTreeSet<String>,
    /// Context keys (of the default kind) always excluded.
    #[serde(default)]
    pub excluded: BTreeSet<String>,
    /// Kind-scoped inclusion lists, checked before `included`.
    #[serde(default)]
    pub included_contexts: Vec<SegmentContextList>,
    /// Kind-scoped exclusion lists, checked before `excluded`.
    #[serde(default)]
    pub excluded_contexts: Vec<SegmentContextList>,
    /// Ordered membership rules, checked after the inclusion/exclusion
    /// lists.
    #[serde(default)]
    pub rules: Vec<SegmentRule>,
    /// Per-segment salt mixed into the bucketing hash for weighted rules.
    #[serde(default)]
    pub salt: String,
    /// Whether membership for this segment is maintained externally
    /// ("big segment").
    #[serde(default)]
    pub unbounded: bool,
    /// The context kind big-segment membership is keyed by, if not `user`.
    #[serde(default)]
    pub unbounded_context_kind: Option<String>,
    /// Generation counter for big-segment membership snapshots.
    #[serde(default)]
    pub generation: Option<i64>,
}

/// A kind-scoped inclusion or exclusion list on a [`Segment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentContextList {
    /// The context kind this list applies to.
    pub context_kind: String,
    /// The context keys, within `context_kind`.
    pub values: BTreeSet<String>,
}

/// A single membership rule on a [`Segment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRule {
    /// A stable identifier for this rule.
    pub id: String,
    /// Every clause must match for the rule to match.
    pub clauses: Vec<Clause>,
    /// If present, the rule matches only a fraction of contexts that would
    /// otherwise match, selected by bucketing (0..=100000).
    #[serde(default)]
    pub weight: Option<u32>,
    /// The attribute bucketed on, defaulting to `key`.
    #[serde(default)]
    pub bucket_by: Option<String>,
    /// The context kind bucketed on, defaulting to `user`.
    #[serde(default)]
    pub rollout_context_kind: Option<String>,
}

// ============================================================================
// SECTION: Clauses
// ============================================================================

/// A single comparison within a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    /// The context kind the clause's attribute is resolved against.
    #[serde(default = "default_context_kind")]
    pub context_kind: String,
    /// The attribute reference (wire form); parsed lazily by the evaluator.
    pub attribute: String,
    /// The comparison operator.
    pub op: ClauseOp,
    /// The literal(s) compared against the resolved attribute value.
    pub values: Vec<Value>,
    /// Whether the match result is inverted.
    #[serde(default)]
    pub negate: bool,
}

fn default_context_kind() -> String {
    "user".to_owned()
}

/// The comparison operator of a [`Clause`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClauseOp {
    /// Deep-equal set membership.
    In,
    /// String suffix match.
    EndsWith,
    /// String prefix match.
    StartsWith,
    /// Regex full-scan match.
    Matches,
    /// String substring match.
    Contains,
    /// Decimal-aware numeric `<`.
    LessThan,
    /// Decimal-aware numeric `<=`.
    LessThanOrEqual,
    /// Decimal-aware numeric `>`.
    GreaterThan,
    /// Decimal-aware numeric `>=`.
    GreaterThanOrEqual,
    /// Temporal `<`.
    Before,
    /// Temporal `>`.
    After,
    /// Semver equality.
    SemVerEqual,
    /// Semver `<`.
    SemVerLessThan,
    /// Semver `>`.
    SemVerGreaterThan,
    /// Named-segment membership.
    SegmentMatch,
}

// ============================================================================
// SECTION: Variation Selection
// ============================================================================

/// Either a fixed variation or a weighted rollout/experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariationOrRollout {
    /// Always serve this variation index.
    Variation {
        /// The served variation index.
        variation: usize,
    },
    /// Serve a variation chosen by bucketing.
    Rollout {
        /// The rollout configuration.
        rollout: Rollout,
    },
}

/// A weighted rollout or experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rollout {
    /// Whether this rollout is a tracked experiment.
    #[serde(default)]
    pub kind: RolloutKind,
    /// The context kind bucketed on, defaulting to `user`.
    #[serde(default)]
    pub context_kind: Option<String>,
    /// The attribute bucketed on, defaulting to `key`.
    #[serde(default)]
    pub bucket_by: Option<String>,
    /// An experiment seed overriding the flag/segment salt in the bucketing
    /// hash input.
    #[serde(default)]
    pub seed: Option<i64>,
    /// The weighted variation list; weights are parts-per-100000.
    pub variations: Vec<WeightedVariation>,
}

/// Whether a [`Rollout`] is a plain percentage rollout or a tracked
/// experiment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RolloutKind {
    /// A plain percentage split; no experiment tracking.
    #[default]
    Rollout,
    /// A tracked experiment; eligible variations emit experiment events.
    Experiment,
}

/// One entry in a [`Rollout`]'s weighted variation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedVariation {
    /// The variation index served when the bucket falls in this entry's
    /// share.
    pub variation: usize,
    /// The share of contexts served this variation, in parts-per-100000.
    pub weight: u32,
    /// Whether this variation is excluded from experiment tracking.
    #[serde(default)]
    pub untracked: bool,
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "test assertions favor panics over error propagation"
    )]

    use super::*;

    #[test]
    fn variation_or_rollout_deserializes_fixed_variation() {
        let json = serde_json::json!({"variation": 1});
        let parsed: VariationOrRollout = serde_json::from_value(json).expect("valid");
        assert_eq!(parsed, VariationOrRollout::Variation { variation: 1 });
    }

    #[test]
    fn variation_or_rollout_deserializes_rollout() {
        let json = serde_json::json!({
            "rollout": {
                "variations": [
                    {"variation": 0, "weight": 60000},
                    {"variation": 1, "weight": 40000},
                ]
            }
        });
        let parsed: VariationOrRollout = serde_json::from_value(json).expect("valid");
        match parsed {
            VariationOrRollout::Rollout { rollout } => {
                assert_eq!(rollout.variations.len(), 2);
                assert_eq!(rollout.kind, RolloutKind::Rollout);
            }
            VariationOrRollout::Variation { .. } => panic!("expected rollout"),
        }
    }
}
