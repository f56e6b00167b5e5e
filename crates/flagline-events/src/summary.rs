// crates/flagline-events/src/summary.rs
// ============================================================================
// Module: Evaluation Summary Table
// Description: Aggregates repeated evaluations of the same flag into a
//              single counter per flush interval.
// Purpose: Let a high-traffic flag generate one small summary entry instead
//          of one event per evaluation.
// Dependencies: flagline-core, serde_json
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde_json::Value;

use crate::model::EvaluationEvent;
use crate::model::OutputEvent;
use crate::model::SummaryCounter;
use crate::model::SummaryFeature;

/// The key identifying one counter bucket within a flag's summary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CounterKey {
    variation: Option<usize>,
    version: Option<i64>,
    value: String,
}

struct FlagSummary {
    default: Value,
    context_kinds: BTreeSet<String>,
    counters: BTreeMap<CounterKey, u64>,
}

/// Accumulates evaluation counts across one flush interval.
#[derive(Default)]
pub struct SummaryTable {
    start_ms: Option<i64>,
    flags: BTreeMap<String, FlagSummary>,
}

impl SummaryTable {
    /// Creates an empty summary table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether any evaluation has been recorded since the last
    /// flush.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Records one evaluation, unless the flag opted out via
    /// `exclude_from_summaries`.
    pub fn record(&mut self, event: &EvaluationEvent, context_kinds: &[&str], now_ms: i64) {
        if event.exclude_from_summaries {
            return;
        }
        self.start_ms.get_or_insert(now_ms);

        let entry = self.flags.entry(event.flag_key.clone()).or_insert_with(|| FlagSummary {
            default: event.default.clone(),
            context_kinds: BTreeSet::new(),
            counters: BTreeMap::new(),
        });
        entry.context_kinds.extend(context_kinds.iter().map(|kind| (*kind).to_owned()));
        let key = CounterKey {
            variation: event.variation_index,
            version: event.flag_version,
            value: event.value.to_string(),
        };
        let count = entry.counters.entry(key).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// Drains the table into a [`OutputEvent::Summary`], or `None` if no
    /// evaluations were recorded this interval.
    pub fn flush(&mut self, end_ms: i64) -> Option<OutputEvent> {
        let start_ms = self.start_ms.take()?;
        let flags = std::mem::take(&mut self.flags);
        if flags.is_empty() {
            return None;
        }
        let features = flags
            .into_iter()
            .map(|(key, summary)| {
                let counters = summary
                    .counters
                    .into_iter()
                    .map(|(counter_key, count)| SummaryCounter {
                        variation: counter_key.variation,
                        version: counter_key.version,
                        value: serde_json::from_str(&counter_key.value)
                            .unwrap_or(Value::Null),
                        count,
                    })
                    .collect();
                (
                    key,
                    SummaryFeature {
                        default: summary.default,
                        context_kinds: summary.context_kinds.into_iter().collect(),
                        counters,
                    },
                )
            })
            .collect();
        Some(OutputEvent::Summary { start_date: start_ms, end_date: end_ms, features })
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "test assertions favor panics over error propagation"
    )]

    use serde_json::json;

    use super::*;

    fn sample_event(flag_key: &str, variation: usize, value: Value) -> EvaluationEvent {
        EvaluationEvent {
            flag_key: flag_key.to_owned(),
            flag_version: Some(3),
            context: flagline_core::Context::single("user", "a", std::collections::BTreeMap::new())
                .expect("valid"),
            value,
            variation_index: Some(variation),
            default: json!(false),
            reason: None,
            prereq_of: None,
            sampling_ratio: None,
            track_events: false,
            debug_events_until_date: None,
            exclude_from_summaries: false,
            creation_date: 1_000,
        }
    }

    #[test]
    fn repeated_evaluations_collapse_into_one_counter() {
        let mut table = SummaryTable::new();
        let event = sample_event("flag", 1, json!(true));
        table.record(&event, &["user"], 1_000);
        table.record(&event, &["user"], 1_001);
        table.record(&event, &["user"], 1_002);

        let flushed = table.flush(2_000).expect("non-empty flush");
        match flushed {
            OutputEvent::Summary { features, start_date, end_date, .. } => {
                assert_eq!(start_date, 1_000);
                assert_eq!(end_date, 2_000);
                let feature = &features["flag"];
                assert_eq!(feature.counters.len(), 1);
                assert_eq!(feature.counters[0].count, 3);
            }
            _ => panic!("expected a summary event"),
        }
    }

    #[test]
    fn excluded_flag_never_enters_the_table() {
        let mut table = SummaryTable::new();
        let mut event = sample_event("flag", 0, json!(false));
        event.exclude_from_summaries = true;
        table.record(&event, &["user"], 1_000);
        assert!(table.is_empty());
        assert!(table.flush(2_000).is_none());
    }

    #[test]
    fn distinct_variations_produce_distinct_counters() {
        let mut table = SummaryTable::new();
        table.record(&sample_event("flag", 0, json!(false)), &["user"], 1_000);
        table.record(&sample_event("flag", 1, json!(true)), &["user"], 1_000);
        let flushed = table.flush(2_000).expect("non-empty flush");
        match flushed {
            OutputEvent::Summary { features, .. } => {
                assert_eq!(features["flag"].counters.len(), 2);
            }
            _ => panic!("expected a summary event"),
        }
    }
}
