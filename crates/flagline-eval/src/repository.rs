// crates/flagline-eval/src/repository.rs
// ============================================================================
// Module: Evaluator Repository Access
// Description: The read-only flag/segment lookup contract the evaluator
//              needs, decoupled from any particular `DataStore`.
// Purpose: Let `flagline-eval` stay independent of `flagline-store`.
// Dependencies: flagline-core
// ============================================================================

use flagline_core::Flag;
use flagline_core::Segment;

/// Read-only access to the current flag/segment snapshot.
///
/// # Invariants
/// - Implementations never block on a network call; a `DataStore`-backed
///   implementation serves from its in-memory or cached view.
pub trait Repository: Send + Sync {
    /// Looks up a flag by key, returning `None` if absent or tombstoned.
    fn get_flag(&self, key: &str) -> Option<Flag>;

    /// Looks up a segment by key, returning `None` if absent or tombstoned.
    fn get_segment(&self, key: &str) -> Option<Segment>;
}
