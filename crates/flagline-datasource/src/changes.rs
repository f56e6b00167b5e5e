// crates/flagline-datasource/src/changes.rs
// ============================================================================
// Module: Flag Change Tracker
// Description: Maintains the flag→prerequisite and flag→segment dependency
//              graph and computes which flags may have changed behavior
//              after a data source init or upsert.
// Purpose: Let a host application subscribe to "this flag's evaluation may
//          now differ" notifications without re-evaluating every flag for
//          every context on every update.
// Dependencies: flagline-core
// ============================================================================

//! ## Overview
//! A flag's dependency set is its own content plus, transitively, any
//! prerequisite flag and any segment referenced by a `segmentMatch` clause
//! (searched across both flag rules and the rules of referenced segments).
//! [`ChangeTracker`] keeps a reverse index of those edges so that a single
//! changed segment can fan out to every flag that might be affected,
//! without re-walking the whole flag set on every update.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::HashSet;

use flagline_core::Clause;
use flagline_core::ClauseOp;
use flagline_core::Flag;
use flagline_core::Segment;

// ============================================================================
// SECTION: Change Event
// ============================================================================

/// Published when a flag's evaluation result may have changed for some
/// context, because the flag itself, one of its prerequisites, or a segment
/// it (transitively) references was updated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlagChangeEvent {
    /// The flag key whose behavior may have changed.
    pub key: String,
}

// ============================================================================
// SECTION: Dependency Graph
// ============================================================================

#[derive(Default)]
struct DependencyGraph {
    /// flag key -> prerequisite flag keys
    flag_prereqs: HashMap<String, HashSet<String>>,
    /// flag key -> segment keys referenced by its rules
    flag_segments: HashMap<String, HashSet<String>>,
    /// segment key -> segment keys referenced by its own rules
    segment_segments: HashMap<String, HashSet<String>>,
}

impl DependencyGraph {
    fn set_flag(&mut self, key: &str, flag: &Flag) {
        let prereqs = flag.prerequisites.iter().map(|p| p.key.as_str().to_owned()).collect();
        self.flag_prereqs.insert(key.to_owned(), prereqs);

        let mut segments = HashSet::new();
        for rule in &flag.rules {
            collect_segment_refs(&rule.clauses, &mut segments);
        }
        self.flag_segments.insert(key.to_owned(), segments);
    }

    fn remove_flag(&mut self, key: &str) {
        self.flag_prereqs.remove(key);
        self.flag_segments.remove(key);
    }

    fn set_segment(&mut self, key: &str, segment: &Segment) {
        let mut segments = HashSet::new();
        for rule in &segment.rules {
            collect_segment_refs(&rule.clauses, &mut segments);
        }
        self.segment_segments.insert(key.to_owned(), segments);
    }

    fn remove_segment(&mut self, key: &str) {
        self.segment_segments.remove(key);
    }

    /// Returns every flag key reachable, by dependency, from the given set
    /// of directly-changed flag and segment keys.
    fn affected_flags(
        &self,
        changed_flags: &HashSet<String>,
        changed_segments: &HashSet<String>,
    ) -> HashSet<String> {
        let mut dirty_segments: HashSet<String> = changed_segments.clone();
        loop {
            let mut grew = false;
            for (segment, refs) in &self.segment_segments {
                if dirty_segments.contains(segment) {
                    continue;
                }
                if refs.iter().any(|referenced| dirty_segments.contains(referenced)) {
                    dirty_segments.insert(segment.clone());
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }

        let mut affected = changed_flags.clone();
        loop {
            let mut grew = false;
            for (flag, prereqs) in &self.flag_prereqs {
                if affected.contains(flag) {
                    continue;
                }
                if prereqs.iter().any(|prereq| affected.contains(prereq)) {
                    affected.insert(flag.clone());
                    grew = true;
                }
            }
            for (flag, segments) in &self.flag_segments {
                if affected.contains(flag) {
                    continue;
                }
                if segments.iter().any(|segment| dirty_segments.contains(segment)) {
                    affected.insert(flag.clone());
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }
        affected
    }
}

fn collect_segment_refs(clauses: &[Clause], out: &mut HashSet<String>) {
    for clause in clauses {
        if clause.op != ClauseOp::SegmentMatch {
            continue;
        }
        for value in &clause.values {
            if let Some(key) = value.as_str() {
                out.insert(key.to_owned());
            }
        }
    }
}

// ============================================================================
// SECTION: Change Tracker
// ============================================================================

/// Tracks the last-known content of every flag and segment, and the
/// dependency graph between them, to compute [`FlagChangeEvent`]s on each
/// data source write.
#[derive(Default)]
pub struct ChangeTracker {
    graph: DependencyGraph,
    flags: HashMap<String, Flag>,
    segments: HashMap<String, Segment>,
}

impl ChangeTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a full snapshot replacement, returning the flags whose
    /// evaluation may now differ.
    pub fn observe_init(&mut self, flags: &[Flag], segments: &[Segment]) -> Vec<FlagChangeEvent> {
        let mut changed_flags = HashSet::new();
        let mut changed_segments = HashSet::new();

        let mut seen_flags = HashSet::new();
        for flag in flags {
            let key = flag.key.as_str().to_owned();
            seen_flags.insert(key.clone());
            if self.flags.get(&key) != Some(flag) {
                changed_flags.insert(key.clone());
            }
            self.graph.set_flag(&key, flag);
            self.flags.insert(key, flag.clone());
        }
        let removed_flags: Vec<String> =
            self.flags.keys().filter(|key| !seen_flags.contains(*key)).cloned().collect();
        for key in removed_flags {
            changed_flags.insert(key.clone());
            self.graph.remove_flag(&key);
            self.flags.remove(&key);
        }

        let mut seen_segments = HashSet::new();
        for segment in segments {
            let key = segment.key.as_str().to_owned();
            seen_segments.insert(key.clone());
            if self.segments.get(&key) != Some(segment) {
                changed_segments.insert(key.clone());
            }
            self.graph.set_segment(&key, segment);
            self.segments.insert(key, segment.clone());
        }
        let removed_segments: Vec<String> =
            self.segments.keys().filter(|key| !seen_segments.contains(*key)).cloned().collect();
        for key in removed_segments {
            changed_segments.insert(key.clone());
            self.graph.remove_segment(&key);
            self.segments.remove(&key);
        }

        self.graph
            .affected_flags(&changed_flags, &changed_segments)
            .into_iter()
            .map(|key| FlagChangeEvent { key })
            .collect()
    }

    /// Records a single flag upsert (or tombstone removal), returning the
    /// flags whose evaluation may now differ.
    pub fn observe_flag_upsert(&mut self, key: &str, flag: Option<&Flag>) -> Vec<FlagChangeEvent> {
        let previous = self.flags.get(key);
        let changed = previous != flag;
        match flag {
            Some(flag) => {
                self.graph.set_flag(key, flag);
                self.flags.insert(key.to_owned(), flag.clone());
            }
            None => {
                self.graph.remove_flag(key);
                self.flags.remove(key);
            }
        }
        if !changed {
            return Vec::new();
        }
        let mut changed_flags = HashSet::new();
        changed_flags.insert(key.to_owned());
        self.graph
            .affected_flags(&changed_flags, &HashSet::new())
            .into_iter()
            .map(|key| FlagChangeEvent { key })
            .collect()
    }

    /// Records a single segment upsert (or tombstone removal), returning the
    /// flags whose evaluation may now differ.
    pub fn observe_segment_upsert(
        &mut self,
        key: &str,
        segment: Option<&Segment>,
    ) -> Vec<FlagChangeEvent> {
        let previous = self.segments.get(key);
        let changed = previous != segment;
        match segment {
            Some(segment) => {
                self.graph.set_segment(key, segment);
                self.segments.insert(key.to_owned(), segment.clone());
            }
            None => {
                self.graph.remove_segment(key);
                self.segments.remove(key);
            }
        }
        if !changed {
            return Vec::new();
        }
        let mut changed_segments = HashSet::new();
        changed_segments.insert(key.to_owned());
        self.graph
            .affected_flags(&HashSet::new(), &changed_segments)
            .into_iter()
            .map(|key| FlagChangeEvent { key })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "test assertions favor panics over error propagation"
    )]

    use flagline_core::ClientSideAvailability;
    use flagline_core::FlagKey;
    use flagline_core::FlagRule;
    use flagline_core::Prerequisite;
    use flagline_core::SegmentKey;
    use flagline_core::VariationOrRollout;
    use serde_json::json;

    use super::*;

    fn bare_flag(key: &str) -> Flag {
        Flag {
            key: FlagKey::new(key),
            version: 1,
            on: true,
            variations: vec![json!(false), json!(true)],
            off_variation: None,
            fallthrough: VariationOrRollout::Variation { variation: 0 },
            targets: Vec::new(),
            context_targets: Vec::new(),
            rules: Vec::new(),
            prerequisites: Vec::new(),
            salt: "s".to_owned(),
            track_events: false,
            track_events_fallthrough: false,
            debug_events_until_date: None,
            client_side_availability: ClientSideAvailability::default(),
            sampling_ratio: None,
            exclude_from_summaries: false,
            migration: None,
        }
    }

    fn bare_segment(key: &str) -> Segment {
        Segment {
            key: SegmentKey::new(key),
            version: 1,
            included: Default::default(),
            excluded: Default::default(),
            included_contexts: Vec::new(),
            excluded_contexts: Vec::new(),
            rules: Vec::new(),
            salt: "s".to_owned(),
            unbounded: false,
            unbounded_context_kind: None,
            generation: None,
        }
    }

    #[test]
    fn changing_a_flag_reports_only_itself_when_no_dependents() {
        let mut tracker = ChangeTracker::new();
        let flag = bare_flag("a");
        tracker.observe_init(&[flag.clone()], &[]);

        let mut updated = flag;
        updated.version = 2;
        let events = tracker.observe_flag_upsert("a", Some(&updated));
        assert_eq!(events, vec![FlagChangeEvent { key: "a".to_owned() }]);
    }

    #[test]
    fn changing_a_prerequisite_reports_the_dependent_flag_too() {
        let mut tracker = ChangeTracker::new();
        let prereq = bare_flag("p");
        let mut dependent = bare_flag("d");
        dependent.prerequisites = vec![Prerequisite { key: FlagKey::new("p"), variation: 1 }];
        tracker.observe_init(&[prereq.clone(), dependent], &[]);

        let mut updated_prereq = prereq;
        updated_prereq.version = 2;
        let mut events = tracker.observe_flag_upsert("p", Some(&updated_prereq));
        events.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(
            events,
            vec![FlagChangeEvent { key: "d".to_owned() }, FlagChangeEvent { key: "p".to_owned() }]
        );
    }

    #[test]
    fn changing_a_referenced_segment_reports_the_flag() {
        let mut tracker = ChangeTracker::new();
        let mut flag = bare_flag("a");
        flag.rules = vec![FlagRule {
            id: "r1".to_owned(),
            clauses: vec![Clause {
                context_kind: "user".to_owned(),
                attribute: "key".to_owned(),
                op: ClauseOp::SegmentMatch,
                values: vec![json!("seg")],
                negate: false,
            }],
            track_events: false,
            variation_or_rollout: VariationOrRollout::Variation { variation: 1 },
        }];
        let segment = bare_segment("seg");
        tracker.observe_init(&[flag], &[segment.clone()]);

        let mut updated_segment = segment;
        updated_segment.version = 2;
        let events = tracker.observe_segment_upsert("seg", Some(&updated_segment));
        assert_eq!(events, vec![FlagChangeEvent { key: "a".to_owned() }]);
    }

    #[test]
    fn unchanged_upsert_reports_nothing() {
        let mut tracker = ChangeTracker::new();
        let flag = bare_flag("a");
        tracker.observe_init(&[flag.clone()], &[]);
        assert!(tracker.observe_flag_upsert("a", Some(&flag)).is_empty());
    }
}
