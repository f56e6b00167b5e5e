// crates/flagline-events/src/model.rs
// ============================================================================
// Module: Event Wire Model
// Description: The events a caller submits to the pipeline, and the JSON
//              shapes the pipeline eventually ships to the control plane.
// Purpose: Separate "what happened" (input events, carrying a live
//          `Context`) from "what we send" (output events, carrying only
//          redacted JSON).
// Dependencies: flagline-core, serde_json
// ============================================================================

use flagline_core::Context;
use serde::Serialize;
use serde_json::Value;

/// One outcome a caller reports to the event pipeline.
///
/// # Invariants
/// - Carries an owned [`Context`] so the pipeline can redact and
///   de-duplicate it independently of the caller's evaluation call stack.
#[derive(Debug, Clone)]
pub enum InputEvent {
    /// A flag evaluation result.
    Evaluation(EvaluationEvent),
    /// A caller explicitly identifying a context (forces an index event).
    Identify {
        /// The identified context.
        context: Context,
        /// Epoch-millisecond creation time.
        creation_date: i64,
    },
    /// A custom application-defined event.
    Custom {
        /// The event key.
        key: String,
        /// The context the event is attributed to.
        context: Context,
        /// Optional free-form data payload.
        data: Option<Value>,
        /// Optional numeric metric value.
        metric_value: Option<f64>,
        /// Epoch-millisecond creation time.
        creation_date: i64,
    },
    /// A migration-stage read/write/consistency measurement.
    MigrationOp(MigrationOpEvent),
}

impl InputEvent {
    /// Returns the context this event is attributed to.
    #[must_use]
    pub fn context(&self) -> &Context {
        match self {
            Self::Evaluation(event) => &event.context,
            Self::Identify { context, .. } | Self::Custom { context, .. } => context,
            Self::MigrationOp(event) => &event.context,
        }
    }
}

/// A single flag evaluation outcome reported to the pipeline.
#[derive(Debug, Clone)]
pub struct EvaluationEvent {
    /// The evaluated flag's key.
    pub flag_key: String,
    /// The flag's version at evaluation time, if known.
    pub flag_version: Option<i64>,
    /// The context evaluated against.
    pub context: Context,
    /// The value served.
    pub value: Value,
    /// The variation index served, or `None` if the default was served.
    pub variation_index: Option<usize>,
    /// The default value passed by the caller.
    pub default: Value,
    /// The evaluation reason, rendered as JSON (opaque to this crate).
    pub reason: Option<Value>,
    /// Set when this evaluation was a prerequisite of another flag.
    pub prereq_of: Option<String>,
    /// The flag's sampling ratio at evaluation time.
    pub sampling_ratio: Option<u32>,
    /// Whether the flag is configured to always emit a full feature event.
    pub track_events: bool,
    /// Epoch-millisecond deadline until which debug events are emitted.
    pub debug_events_until_date: Option<i64>,
    /// Whether this flag's evaluations are excluded from summary counters.
    pub exclude_from_summaries: bool,
    /// Epoch-millisecond creation time.
    pub creation_date: i64,
}

/// A migration-stage read or write measurement.
#[derive(Debug, Clone)]
pub struct MigrationOpEvent {
    /// The context the operation was attributed to.
    pub context: Context,
    /// `"read"` or `"write"`.
    pub operation: &'static str,
    /// The underlying flag evaluation that selected the migration stage.
    pub evaluation: EvaluationEvent,
    /// Opaque measurement payloads (latency, consistency, error counts).
    pub measurements: Vec<Value>,
    /// The flag's sampling ratio at evaluation time.
    pub sampling_ratio: Option<u32>,
    /// Epoch-millisecond creation time.
    pub creation_date: i64,
}

// ============================================================================
// SECTION: Output Events
// ============================================================================

/// One entry in the JSON array shipped to the events endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputEvent {
    /// First sighting of a context within a flush interval.
    Index {
        /// Epoch-millisecond creation time.
        #[serde(rename = "creationDate")]
        creation_date: i64,
        /// The redacted context.
        context: Value,
    },
    /// A full, non-summarized feature evaluation event.
    Feature {
        /// Epoch-millisecond creation time.
        #[serde(rename = "creationDate")]
        creation_date: i64,
        /// The evaluated flag's key.
        key: String,
        /// The redacted context.
        context: Value,
        /// The value served.
        value: Value,
        /// The variation index served.
        variation: Option<usize>,
        /// The caller-supplied default.
        default: Value,
        /// The flag's version.
        version: Option<i64>,
        /// The evaluation reason.
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<Value>,
        /// Set when this was a prerequisite evaluation.
        #[serde(rename = "prereqOf", skip_serializing_if = "Option::is_none")]
        prereq_of: Option<String>,
        /// The flag's sampling ratio.
        #[serde(rename = "samplingRatio", skip_serializing_if = "Option::is_none")]
        sampling_ratio: Option<u32>,
        /// Whether this event bypassed summarization.
        #[serde(rename = "trackEvents", skip_serializing_if = "Option::is_none")]
        track_events: Option<bool>,
    },
    /// A caller-initiated identify event.
    Identify {
        /// Epoch-millisecond creation time.
        #[serde(rename = "creationDate")]
        creation_date: i64,
        /// The redacted context.
        context: Value,
    },
    /// A custom application-defined event.
    Custom {
        /// Epoch-millisecond creation time.
        #[serde(rename = "creationDate")]
        creation_date: i64,
        /// The event key.
        key: String,
        /// The redacted context.
        context: Value,
        /// Optional free-form data payload.
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        /// Optional numeric metric value.
        #[serde(rename = "metricValue", skip_serializing_if = "Option::is_none")]
        metric_value: Option<f64>,
    },
    /// A migration-stage measurement event.
    MigrationOp {
        /// Epoch-millisecond creation time.
        #[serde(rename = "creationDate")]
        creation_date: i64,
        /// `"read"` or `"write"`.
        operation: &'static str,
        /// The evaluation that selected the migration stage.
        evaluation: Value,
        /// Opaque measurement payloads.
        measurements: Vec<Value>,
        /// The flag's sampling ratio.
        #[serde(rename = "samplingRatio", skip_serializing_if = "Option::is_none")]
        sampling_ratio: Option<u32>,
    },
    /// An aggregated summary of evaluations over one flush interval.
    Summary {
        /// Epoch-millisecond start of the interval.
        #[serde(rename = "startDate")]
        start_date: i64,
        /// Epoch-millisecond end of the interval.
        #[serde(rename = "endDate")]
        end_date: i64,
        /// Per-flag aggregated counters.
        features: std::collections::BTreeMap<String, SummaryFeature>,
    },
}

/// One flag's aggregated counters within a [`OutputEvent::Summary`].
#[derive(Debug, Clone, Serialize)]
pub struct SummaryFeature {
    /// The default value used when no variation counter applies.
    pub default: Value,
    /// The context kinds observed for this flag during the interval.
    #[serde(rename = "contextKinds")]
    pub context_kinds: Vec<String>,
    /// Per-`(variation, version, value)` counters.
    pub counters: Vec<SummaryCounter>,
}

/// One counter entry within a [`SummaryFeature`].
#[derive(Debug, Clone, Serialize)]
pub struct SummaryCounter {
    /// The variation index served, if a variation (not the default) was
    /// served.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation: Option<usize>,
    /// The flag's version at evaluation time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    /// The value served.
    pub value: Value,
    /// The number of evaluations this counter aggregates.
    pub count: u64,
}
