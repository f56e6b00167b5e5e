// crates/flagline-datasource/src/backoff.rs
// ============================================================================
// Module: Reconnection Backoff
// Description: Exponential backoff with full jitter for the polling and
//              streaming data sources' retry loops.
// Purpose: Avoid a thundering herd against the control plane after a shared
//          outage, while still recovering quickly from a single blip.
// Dependencies: rand, std::time
// ============================================================================

use std::time::Duration;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Exponential backoff with full jitter, capped at a maximum delay.
///
/// # Invariants
/// - `delay()` never exceeds `max`.
/// - `reset()` returns the sequence to its initial state after a successful
///   sync, so a transient blip doesn't leave future reconnects slower than
///   necessary.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
    rng: StdRng,
}

impl Backoff {
    /// Builds a backoff sequence starting at `initial`, doubling each
    /// attempt, capped at `max`.
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max, attempt: 0, rng: StdRng::from_entropy() }
    }

    /// Returns the delay for the current attempt and advances to the next.
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempt.min(30);
        self.attempt = self.attempt.saturating_add(1);
        let multiplier = 1_u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let full = self.initial.as_millis_f64_like();
        let uncapped = full.saturating_mul(multiplier);
        let capped = uncapped.min(self.max_millis());
        let jitter_fraction = self.rng.gen_range(0.5..1.0);
        #[allow(
            clippy::cast_precision_loss,
            reason = "jitter only needs millisecond-scale approximation, not exactness"
        )]
        let jittered = (capped as f64) * jitter_fraction;
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "jittered is bounded by capped, itself bounded by max_millis()"
        )]
        Duration::from_millis(jittered as u64)
    }

    /// Resets the attempt counter after a successful sync.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    fn max_millis(&self) -> u64 {
        u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX)
    }
}

trait MillisLike {
    fn as_millis_f64_like(&self) -> u64;
}

impl MillisLike for Duration {
    fn as_millis_f64_like(&self) -> u64 {
        u64::try_from(self.as_millis()).unwrap_or(u64::MAX)
    }
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
    fn delay_never_exceeds_max() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(5));
        for _ in 0..40 {
            let delay = backoff.next_delay();
            assert!(delay <= Duration::from_secs(5));
        }
    }

    #[test]
    fn reset_restarts_the_sequence() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(5));
        let _ = backoff.next_delay();
        let _ = backoff.next_delay();
        backoff.reset();
        let first = backoff.next_delay();
        assert!(first <= Duration::from_millis(100));
    }
}
