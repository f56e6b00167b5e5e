// crates/flagline-events/src/sampling.rs
// ============================================================================
// Module: Sampling Ratio
// Description: Decides whether a given evaluation should be emitted at all,
//              based on a flag's configured sampling ratio.
// Purpose: Let a high-traffic flag opt into emitting only a fraction of its
//          events, independent of summarization.
// Dependencies: rand
// ============================================================================

//! A `sampling_ratio` of `N` means "emit with probability `1/N`". A ratio of
//! `0` or `1` always emits. The draw happens once per event, at the point
//! the event is submitted to the pipeline, not at summarization time.

use rand::Rng;

/// Returns whether an event with the given sampling ratio should be
/// emitted, drawing from `rng`.
pub fn should_sample(sampling_ratio: Option<u32>, rng: &mut impl Rng) -> bool {
    match sampling_ratio {
        None | Some(0 | 1) => true,
        Some(ratio) => rng.gen_range(0..ratio) == 0,
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "test assertions favor panics over error propagation"
    )]

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn none_and_one_always_sample() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(should_sample(None, &mut rng));
        assert!(should_sample(Some(0), &mut rng));
        assert!(should_sample(Some(1), &mut rng));
    }

    #[test]
    fn ratio_of_ten_samples_roughly_a_tenth() {
        let mut rng = StdRng::seed_from_u64(7);
        let sampled = (0..10_000).filter(|_| should_sample(Some(10), &mut rng)).count();
        assert!(sampled > 500 && sampled < 1_500, "sampled {sampled} of 10000");
    }
}
