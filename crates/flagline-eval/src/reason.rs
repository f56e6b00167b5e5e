// crates/flagline-eval/src/reason.rs
// ============================================================================
// Module: Evaluation Reasons
// Description: The reason taxonomy attached to every evaluation result.
// Purpose: Let callers (and the event pipeline) tell why a variation was
//          served without re-running the evaluator.
// Dependencies: flagline_core::FlagKey
// ============================================================================

use flagline_core::FlagKey;

/// Why the evaluator served the value it did.
///
/// # Invariants
/// - `Fallthrough` and `RuleMatch` are the only reasons that can carry
///   `in_experiment: true`.
#[derive(Debug, Clone, PartialEq)]
pub enum Reason {
    /// The flag's `on` flag was false.
    Off,
    /// No target or rule matched; the flag's `fallthrough` was served.
    Fallthrough {
        /// Whether this fallthrough hit an experiment variation.
        in_experiment: bool,
    },
    /// An individual-context or context-kind target matched.
    TargetMatch,
    /// A targeting rule matched.
    RuleMatch {
        /// The rule's position in `flag.rules`.
        rule_index: usize,
        /// The rule's stable identifier.
        rule_id: String,
        /// Whether this rule hit an experiment variation.
        in_experiment: bool,
    },
    /// A prerequisite flag failed, was off, or served an unexpected
    /// variation.
    PrerequisiteFailed {
        /// The prerequisite flag's key.
        prerequisite_key: FlagKey,
    },
    /// Evaluation could not proceed; `default` was served.
    Error {
        /// The specific failure classification.
        kind: ErrorKind,
    },
}

impl Reason {
    /// Returns whether this reason carries `in_experiment: true`.
    #[must_use]
    pub const fn in_experiment(&self) -> bool {
        match self {
            Self::Fallthrough { in_experiment } | Self::RuleMatch { in_experiment, .. } => {
                *in_experiment
            }
            Self::Off | Self::TargetMatch | Self::PrerequisiteFailed { .. } | Self::Error { .. } => {
                false
            }
        }
    }
}

/// The classification of an [`Reason::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The client had not finished initializing.
    ClientNotReady,
    /// No flag with the requested key exists.
    FlagNotFound,
    /// The flag's data was structurally invalid (e.g. a prerequisite cycle,
    /// or segment recursion past the configured depth).
    MalformedFlag,
    /// The caller did not supply a context.
    UserNotSpecified,
    /// The served value's JSON type did not match the requested accessor
    /// (`bool_variation` on a string flag, etc).
    WrongType,
    /// An internal failure not covered by the other kinds.
    Exception,
}
