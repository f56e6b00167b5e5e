// crates/flagline-eval/src/bucketing.rs
// ============================================================================
// Module: Context Bucketing
// Description: The deterministic SHA-1-based bucketing algorithm used by
//              rollouts, experiments, and weighted segment rules.
// Purpose: Map a context to a float in [0,1) that is stable across process
//          restarts and SDK implementations.
// Dependencies: flagline-core, sha1, hex
// ============================================================================

//! ## Overview
//! Bucketing hashes `"{salt-input}.{value}"` with SHA-1, takes the first 15
//! hex characters, and divides by `0xFFFFFFFFFFFFFFF` to land in `[0,1)`.
//! This exact recipe is a wire-format detail shared by every implementation
//! of this rule language, not a style choice, so it cannot be swapped for a
//! different hash without breaking cross-SDK consistency.

// ============================================================================
// SECTION: Imports
// ============================================================================

use flagline_core::Context;
use hex::ToHex;
use sha1::Digest;
use sha1::Sha1;

use flagline_core::WeightedVariation;

/// The hard cap on segment-referencing-segment recursion depth (§9, open
/// question b). Exposed as a named constant rather than inlined so an
/// integrator can audit it.
pub const MAX_SEGMENT_RECURSION_DEPTH: u32 = 20;

const BUCKET_DIVIDER: f64 = 0x0FFF_FFFF_FFFF_FFFFu64 as f64;

/// The resolved bucketing input: the stringified attribute value, and
/// whether the value was eligible for experiment tracking (numeric/string
/// values are; a missing or structurally unsupported value is not).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketingValue {
    /// The stringified attribute value, or `None` if the attribute was
    /// missing or not a bucketable type.
    pub value: Option<String>,
}

/// Resolves the bucketing attribute on `context`, scoped to `context_kind`,
/// per the stringification rules in §4.1.2.
#[must_use]
pub fn resolve_bucketing_value(context: &Context, context_kind: &str, bucket_by: &str) -> BucketingValue {
    let Some(part) = context.part_for_kind(context_kind) else {
        return BucketingValue { value: None };
    };
    let attr = flagline_core::AttributeRef::Plain(bucket_by.to_owned());
    let Some(value) = part.get_attribute(&attr) else {
        return BucketingValue { value: None };
    };
    let stringified = match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                Some(n.to_string())
            } else {
                None
            }
        }
        _ => None,
    };
    BucketingValue { value: stringified }
}

/// Computes the bucket for a resolved bucketing value, mixing in either the
/// rollout/experiment `seed` or the flag/segment `salt`.
///
/// Returns `0.0` when `value` is `None`, matching "if missing, bucket = 0.0".
#[must_use]
pub fn bucket(flag_or_segment_key: &str, salt: &str, seed: Option<i64>, value: &BucketingValue) -> f64 {
    let Some(raw_value) = &value.value else {
        return 0.0;
    };
    let input = seed.map_or_else(
        || format!("{flag_or_segment_key}.{salt}.{raw_value}"),
        |seed| format!("{seed}.{raw_value}"),
    );
    hash_to_unit_interval(&input)
}

fn hash_to_unit_interval(input: &str) -> f64 {
    let digest = Sha1::new_with_prefix(input.as_bytes()).finalize();
    let mut hex_digest: String = digest.encode_hex();
    hex_digest.truncate(15);
    #[allow(
        clippy::cast_precision_loss,
        reason = "a 60-bit integer losslessly fits f64's 53-bit mantissa only approximately, which matches every other implementation of this bucketing recipe"
    )]
    let numeric = u64::from_str_radix(&hex_digest, 16).unwrap_or(0) as f64;
    numeric / BUCKET_DIVIDER
}

/// Walks a weighted variation list, picking the first entry whose
/// cumulative share exceeds `bucket_value`. The last entry absorbs any
/// rounding shortfall so a bucket that lands at or past the nominal end of
/// the list still resolves to a variation (§9, open question a).
#[must_use]
pub fn pick_weighted_variation(
    variations: &[WeightedVariation],
    bucket_value: f64,
) -> Option<&WeightedVariation> {
    let mut cumulative = 0.0;
    for variation in variations {
        cumulative += f64::from(variation.weight) / 100_000.0;
        if bucket_value < cumulative {
            return Some(variation);
        }
    }
    variations.last()
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

    #[test]
    fn bucket_matches_reference_hash_recipe() {
        let ctx = Context::single("user", "userkey", BTreeMap::new()).expect("valid");
        let value = resolve_bucketing_value(&ctx, "user", "key");
        let b = bucket("flag-key", "s", None, &value);
        assert!((0.0..1.0).contains(&b));

        // Independently recompute via the same recipe to pin the constant.
        let expected = hash_to_unit_interval("flag-key.s.userkey");
        assert!((b - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_attribute_buckets_to_zero() {
        let ctx = Context::single("user", "userkey", BTreeMap::new()).expect("valid");
        let value = resolve_bucketing_value(&ctx, "user", "does-not-exist");
        assert_eq!(value.value, None);
        assert_eq!(bucket("flag-key", "s", None, &value), 0.0);
    }

    #[test]
    fn weighted_pick_absorbs_rounding_at_the_end() {
        let variations = vec![
            WeightedVariation { variation: 0, weight: 60_000, untracked: false },
            WeightedVariation { variation: 1, weight: 39_999, untracked: false },
        ];
        let picked = pick_weighted_variation(&variations, 0.999_999_9).expect("absorbed by last");
        assert_eq!(picked.variation, 1);
    }

    #[test]
    fn weighted_pick_selects_first_bucket_under_threshold() {
        let variations = vec![
            WeightedVariation { variation: 0, weight: 60_000, untracked: false },
            WeightedVariation { variation: 1, weight: 40_000, untracked: false },
        ];
        let picked = pick_weighted_variation(&variations, 0.1).expect("non-empty");
        assert_eq!(picked.variation, 0);
    }

    #[test]
    fn seed_overrides_salt_in_hash_input() {
        let ctx = Context::single("user", "userkey", BTreeMap::new()).expect("valid");
        let value = resolve_bucketing_value(&ctx, "user", "key");
        let with_seed = bucket("flag-key", "s", Some(42), &value);
        let expected = hash_to_unit_interval("42.userkey");
        assert!((with_seed - expected).abs() < f64::EPSILON);
    }
}
