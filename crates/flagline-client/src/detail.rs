// crates/flagline-client/src/detail.rs
// ============================================================================
// Module: Evaluation Detail
// Description: The caller-facing detail value returned by `variation_detail`,
//              and the JSON rendering of `flagline_eval::Reason`.
// Purpose: Give callers the served value, variation index, and reason
//          without exposing `flagline_eval`'s internal reason type.
// Dependencies: flagline-eval, serde_json
// ============================================================================

use flagline_eval::ErrorKind;
use flagline_eval::Reason;
use serde_json::Value;
use serde_json::json;

/// The outcome of a `variation_detail` call: the served value, which
/// variation produced it, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalDetail {
    /// The served value.
    pub value: Value,
    /// The index into the flag's variations that was served, or `None`
    /// when the caller's default was served instead.
    pub variation_index: Option<usize>,
    /// The evaluation reason, rendered as JSON.
    pub reason: Value,
}

/// Renders a [`Reason`] to the JSON shape callers and the event pipeline
/// both expect: a `kind` discriminator plus reason-specific fields.
#[must_use]
pub fn reason_to_json(reason: &Reason) -> Value {
    match reason {
        Reason::Off => json!({ "kind": "OFF" }),
        Reason::Fallthrough { in_experiment } => {
            json!({ "kind": "FALLTHROUGH", "inExperiment": in_experiment })
        }
        Reason::TargetMatch => json!({ "kind": "TARGET_MATCH" }),
        Reason::RuleMatch { rule_index, rule_id, in_experiment } => json!({
            "kind": "RULE_MATCH",
            "ruleIndex": rule_index,
            "ruleId": rule_id,
            "inExperiment": in_experiment,
        }),
        Reason::PrerequisiteFailed { prerequisite_key } => json!({
            "kind": "PREREQUISITE_FAILED",
            "prerequisiteKey": prerequisite_key.as_str(),
        }),
        Reason::Error { kind } => json!({ "kind": "ERROR", "errorKind": error_kind_name(*kind) }),
    }
}

/// Renders an [`ErrorKind`] the way the reason JSON shape expects.
const fn error_kind_name(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::ClientNotReady => "CLIENT_NOT_READY",
        ErrorKind::FlagNotFound => "FLAG_NOT_FOUND",
        ErrorKind::MalformedFlag => "MALFORMED_FLAG",
        ErrorKind::UserNotSpecified => "USER_NOT_SPECIFIED",
        ErrorKind::WrongType => "WRONG_TYPE",
        ErrorKind::Exception => "EXCEPTION",
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
    fn fallthrough_renders_in_experiment_flag() {
        let rendered = reason_to_json(&Reason::Fallthrough { in_experiment: true });
        assert_eq!(rendered["kind"], json!("FALLTHROUGH"));
        assert_eq!(rendered["inExperiment"], json!(true));
    }

    #[test]
    fn error_renders_its_kind_name() {
        let rendered = reason_to_json(&Reason::Error { kind: ErrorKind::WrongType });
        assert_eq!(rendered["kind"], json!("ERROR"));
        assert_eq!(rendered["errorKind"], json!("WRONG_TYPE"));
    }
}
