// crates/flagline-client/src/client.rs
// ============================================================================
// Module: Client Core
// Description: The orchestrator wiring the evaluator, data store, data
//              source, big segment bridge, and event pipeline behind one
//              lifecycle.
// Purpose: Give a host application a single object to call `variation`,
//          `identify`, `track`, `flush`, and `close` against, without it
//          needing to know how those pieces are individually wired.
// Dependencies: flagline-core, flagline-eval, flagline-events, flagline-store
// ============================================================================

//! ## Overview
//! This is the seam where an (out-of-scope) public facade would attach: it
//! accepts already-constructed components rather than a config-file format
//! or environment-variable parser of its own. In offline mode every
//! evaluation serves its default and no events are generated, regardless of
//! what data source or event pipeline configuration was supplied.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use flagline_core::BigSegmentsProvider;
use flagline_core::Context;
use flagline_core::DataKind;
use flagline_core::DataSourceState;
use flagline_core::DataSourceStatus;
use flagline_core::DataStore;
use flagline_core::Flag;
use flagline_eval::EvalResult;
use flagline_eval::ErrorKind;
use flagline_eval::Reason;
use flagline_eval::evaluate;
use flagline_events::EvaluationEvent;
use flagline_events::EventPipeline;
use flagline_events::InputEvent;
use flagline_events::MigrationOpEvent;
use flagline_events::now_ms;
use flagline_store::TypedRepository;
use hmac::Hmac;
use hmac::Mac;
use serde_json::Value;
use sha2::Sha256;

use crate::all_flags::AllFlagsOptions;
use crate::all_flags::AllFlagsState;
use crate::all_flags::FlagState;
use crate::detail::EvalDetail;
use crate::detail::reason_to_json;
use crate::source::DataSourceHandle;

type HmacSha256 = Hmac<Sha256>;

/// The running client core. Generic over the data store implementation so
/// that no object-safety shim is needed for [`flagline_core::DataStore`]'s
/// associated error type.
pub struct Client<S: DataStore + 'static> {
    sdk_key: String,
    store: Arc<S>,
    data_source: Option<Box<dyn DataSourceHandle>>,
    big_segments: Option<Arc<dyn BigSegmentsProvider>>,
    events: Option<EventPipeline>,
    initialized: bool,
    offline: bool,
}

impl<S: DataStore + 'static> Client<S> {
    pub(crate) fn assemble(
        sdk_key: String,
        store: Arc<S>,
        data_source: Option<Box<dyn DataSourceHandle>>,
        big_segments: Option<Arc<dyn BigSegmentsProvider>>,
        events: Option<EventPipeline>,
        initialized: bool,
        offline: bool,
    ) -> Self {
        Self { sdk_key, store, data_source, big_segments, events, initialized, offline }
    }

    /// Returns whether the client has completed its first successful sync
    /// (or is in offline mode, which is trivially ready).
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.offline
            || self.initialized
            || self.data_source.as_ref().is_some_and(|source| matches!(source.status().state, DataSourceState::Valid))
    }

    /// Returns the data source's current lifecycle status, or `None` if no
    /// data source is configured.
    #[must_use]
    pub fn data_source_status(&self) -> Option<DataSourceStatus> {
        self.data_source.as_ref().map(|source| source.status())
    }

    /// Evaluates `flag_key` against `context`, returning the served value.
    #[must_use]
    pub fn variation(&self, flag_key: &str, context: &Context, default: Value) -> Value {
        self.variation_detail(flag_key, context, default).value
    }

    /// Evaluates `flag_key` against `context`, returning the served value,
    /// the variation index, and the reason it was served.
    #[must_use]
    pub fn variation_detail(&self, flag_key: &str, context: &Context, default: Value) -> EvalDetail {
        let (flag, result) = self.evaluate_flag(flag_key, context, &default);
        self.record_evaluation(flag_key, flag.as_ref(), context, &default, &result, None);
        for prereq in &result.prerequisite_events {
            let prereq_flag = self.repository().get_flag(prereq.flag_key.as_str());
            self.record_prerequisite(prereq_flag.as_ref(), context, prereq, flag_key);
        }
        EvalDetail { value: result.value, variation_index: result.variation_index, reason: reason_to_json(&result.reason) }
    }

    /// Evaluates every flag in the store against `context`.
    #[must_use]
    pub fn all_flags_state(&self, context: &Context, options: AllFlagsOptions) -> AllFlagsState {
        let Ok(all_flags) = self.store.all(DataKind::Flags) else {
            return AllFlagsState { valid: false, flags: BTreeMap::new() };
        };
        let repository = self.repository();
        let mut flags = BTreeMap::new();
        for (key, raw) in all_flags {
            let Ok(flag) = serde_json::from_value::<Flag>(raw) else { continue };
            if options.client_side_only && !flag.client_side_availability.using_environment_id {
                continue;
            }
            let result = evaluate(&flag, context, &repository, self.big_segments.as_deref(), &Value::Null);
            let include_metadata = !options.details_only_for_tracked_flags || flag.track_events;
            flags.insert(
                key,
                FlagState {
                    value: result.value,
                    variation: include_metadata.then_some(result.variation_index).flatten(),
                    version: flag.version,
                    reason: (options.with_reasons && include_metadata).then(|| reason_to_json(&result.reason)),
                    track_events: flag.track_events,
                },
            );
        }
        AllFlagsState { valid: self.is_initialized(), flags }
    }

    /// Records an explicit identify event, forcing an index event for
    /// `context` even if it was already seen this flush interval.
    pub fn identify(&self, context: &Context) {
        if self.offline {
            return;
        }
        self.submit(InputEvent::Identify { context: context.clone(), creation_date: now_ms() });
    }

    /// Records a custom, application-defined event.
    pub fn track(&self, event_key: &str, context: &Context, data: Option<Value>, metric_value: Option<f64>) {
        if self.offline {
            return;
        }
        self.submit(InputEvent::Custom {
            key: event_key.to_owned(),
            context: context.clone(),
            data,
            metric_value,
            creation_date: now_ms(),
        });
    }

    /// Evaluates a migration stage flag and records the read/write
    /// measurement alongside it.
    #[must_use]
    pub fn track_migration_op(
        &self,
        flag_key: &str,
        context: &Context,
        operation: &'static str,
        default_stage: Value,
        measurements: Vec<Value>,
    ) -> Value {
        let (flag, result) = self.evaluate_flag(flag_key, context, &default_stage);
        let creation_date = now_ms();
        let evaluation = self.build_evaluation_event(flag_key, flag.as_ref(), context, default_stage, &result, None, creation_date);
        let sampling_ratio = flag.as_ref().and_then(|flag| flag.sampling_ratio);
        if !self.offline {
            self.submit(InputEvent::MigrationOp(MigrationOpEvent {
                context: context.clone(),
                operation,
                evaluation,
                measurements,
                sampling_ratio,
                creation_date,
            }));
        }
        result.value
    }

    /// Computes the secure mode hash (HMAC-SHA-256 of `context`'s
    /// fully-qualified key, hex-encoded) used to authenticate client-side
    /// JavaScript SDK requests.
    #[must_use]
    pub fn secure_mode_hash(&self, context: &Context) -> String {
        #[allow(clippy::expect_used, reason = "HMAC accepts a key of any length; this constructor is infallible for Sha256")]
        let mut mac = HmacSha256::new_from_slice(self.sdk_key.as_bytes()).expect("hmac accepts any key length");
        mac.update(context.fully_qualified_key().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Forces an immediate event flush, blocking until the consumer thread
    /// has processed it.
    pub fn flush(&self) {
        if let Some(events) = &self.events {
            events.flush();
        }
    }

    /// Shuts the client down: stops the data source, flushes and stops the
    /// event pipeline.
    pub fn close(self) {
        if let Some(data_source) = self.data_source {
            data_source.stop();
        }
        if let Some(events) = self.events {
            events.flush();
            events.close();
        }
    }

    /// Adapts the store into the typed repository the evaluator reads.
    fn repository(&self) -> TypedRepository<'_, S> {
        TypedRepository::new(self.store.as_ref())
    }

    /// Looks up and evaluates `flag_key`, short-circuiting to an error
    /// result when offline, not yet initialized, or the flag is unknown.
    fn evaluate_flag(&self, flag_key: &str, context: &Context, default: &Value) -> (Option<Flag>, EvalResult) {
        if self.offline || !self.is_initialized() {
            return (None, not_ready_result(default));
        }
        let repository = self.repository();
        let Some(flag) = repository.get_flag(flag_key) else {
            return (None, flag_not_found_result(default));
        };
        let result = evaluate(&flag, context, &repository, self.big_segments.as_deref(), default);
        (Some(flag), result)
    }

    /// Forwards an event to the pipeline, if one is configured.
    fn submit(&self, event: InputEvent) {
        if let Some(events) = &self.events {
            let _accepted = events.submit(event);
        }
    }

    /// Builds and submits the feature event for a top-level evaluation.
    fn record_evaluation(
        &self,
        flag_key: &str,
        flag: Option<&Flag>,
        context: &Context,
        default: &Value,
        result: &EvalResult,
        prereq_of: Option<String>,
    ) {
        if self.offline {
            return;
        }
        let creation_date = now_ms();
        let event = self.build_evaluation_event(flag_key, flag, context, default.clone(), result, prereq_of, creation_date);
        self.submit(InputEvent::Evaluation(event));
    }

    /// Builds and submits the feature event for a prerequisite flag
    /// evaluated while resolving `prereq_of`.
    fn record_prerequisite(
        &self,
        flag: Option<&Flag>,
        context: &Context,
        prereq: &flagline_eval::PrerequisiteEvaluationEvent,
        prereq_of: &str,
    ) {
        if self.offline {
            return;
        }
        let creation_date = now_ms();
        let event = EvaluationEvent {
            flag_key: prereq.flag_key.as_str().to_owned(),
            flag_version: Some(prereq.flag_version),
            context: context.clone(),
            value: prereq.value.clone(),
            variation_index: prereq.variation_index,
            default: Value::Null,
            reason: Some(reason_to_json(&prereq.reason)),
            prereq_of: Some(prereq_of.to_owned()),
            sampling_ratio: flag.and_then(|flag| flag.sampling_ratio),
            track_events: flag.is_some_and(|flag| flag.track_events),
            debug_events_until_date: flag.and_then(|flag| flag.debug_events_until_date),
            exclude_from_summaries: flag.is_some_and(|flag| flag.exclude_from_summaries),
            creation_date,
        };
        self.submit(InputEvent::Evaluation(event));
    }

    /// Assembles an [`EvaluationEvent`] from an evaluation outcome and the
    /// flag metadata (if the flag was found) that shapes its sampling and
    /// tracking behavior.
    fn build_evaluation_event(
        &self,
        flag_key: &str,
        flag: Option<&Flag>,
        context: &Context,
        default: Value,
        result: &EvalResult,
        prereq_of: Option<String>,
        creation_date: i64,
    ) -> EvaluationEvent {
        EvaluationEvent {
            flag_key: flag_key.to_owned(),
            flag_version: flag.map(|flag| flag.version),
            context: context.clone(),
            value: result.value.clone(),
            variation_index: result.variation_index,
            default,
            reason: Some(reason_to_json(&result.reason)),
            prereq_of,
            sampling_ratio: flag.and_then(|flag| flag.sampling_ratio),
            track_events: flag.is_some_and(|flag| flag.track_events),
            debug_events_until_date: flag.and_then(|flag| flag.debug_events_until_date),
            exclude_from_summaries: flag.is_some_and(|flag| flag.exclude_from_summaries),
            creation_date,
        }
    }
}

/// An eval result reporting that the client cannot serve flags yet.
fn not_ready_result(default: &Value) -> EvalResult {
    EvalResult {
        value: default.clone(),
        variation_index: None,
        reason: Reason::Error { kind: ErrorKind::ClientNotReady },
        prerequisite_events: Vec::new(),
        big_segments_status: None,
    }
}

/// An eval result reporting that no flag with the requested key exists.
fn flag_not_found_result(default: &Value) -> EvalResult {
    EvalResult {
        value: default.clone(),
        variation_index: None,
        reason: Reason::Error { kind: ErrorKind::FlagNotFound },
        prerequisite_events: Vec::new(),
        big_segments_status: None,
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "test assertions favor panics over error propagation"
    )]

    use std::collections::BTreeMap;
    use std::sync::Arc;

    use flagline_core::ClientSideAvailability;
    use flagline_core::Context;
    use flagline_core::DataStore;
    use flagline_core::Flag;
    use flagline_core::FlagKey;
    use flagline_core::VariationOrRollout;
    use flagline_store::MemoryDataStore;
    use serde_json::Value;
    use serde_json::json;

    use crate::builder::ClientBuilder;

    fn bool_flag(key: &str) -> Flag {
        Flag {
            key: FlagKey::new(key),
            version: 1,
            on: true,
            variations: vec![Value::Bool(true), Value::Bool(false)],
            off_variation: Some(1),
            fallthrough: VariationOrRollout::Variation { variation: 0 },
            targets: Vec::new(),
            context_targets: Vec::new(),
            rules: Vec::new(),
            prerequisites: Vec::new(),
            salt: "salt".to_owned(),
            track_events: true,
            track_events_fallthrough: false,
            debug_events_until_date: None,
            client_side_availability: ClientSideAvailability::default(),
            sampling_ratio: None,
            exclude_from_summaries: false,
            migration: None,
        }
    }

    fn store_with(flag: Flag) -> Arc<MemoryDataStore> {
        let store = Arc::new(MemoryDataStore::new());
        let raw = serde_json::to_value(&flag).expect("serializable flag");
        store.init(vec![(flag.key.as_str().to_owned(), flagline_core::StoredItem::live(flag.version, raw))], Vec::new()).expect("infallible store");
        store
    }

    #[test]
    fn offline_client_serves_default_and_reports_initialized() {
        let store = store_with(bool_flag("demo"));
        let client = ClientBuilder::new("sdk-key", store).offline().build().expect("builds offline");
        let ctx = Context::single("user", "u1", BTreeMap::new()).expect("valid context");

        assert!(client.is_initialized());
        assert_eq!(client.variation("demo", &ctx, Value::Bool(false)), Value::Bool(false));
    }

    #[test]
    fn in_process_client_with_no_data_source_evaluates_from_its_store() {
        let store = store_with(bool_flag("demo"));
        let client = ClientBuilder::new("sdk-key", store).build().expect("builds without a data source");
        let ctx = Context::single("user", "u1", BTreeMap::new()).expect("valid context");

        assert!(client.is_initialized());
        let detail = client.variation_detail("demo", &ctx, Value::Bool(false));
        assert_eq!(detail.value, Value::Bool(true));
        assert_eq!(detail.variation_index, Some(0));
    }

    #[test]
    fn unknown_flag_serves_default_with_flag_not_found_reason() {
        let store = Arc::new(MemoryDataStore::new());
        store.init(Vec::new(), Vec::new()).expect("infallible store");
        let client = ClientBuilder::new("sdk-key", store).build().expect("builds");
        let ctx = Context::single("user", "u1", BTreeMap::new()).expect("valid context");

        let detail = client.variation_detail("missing", &ctx, json!("fallback"));
        assert_eq!(detail.value, json!("fallback"));
        assert_eq!(detail.reason["kind"], json!("ERROR"));
        assert_eq!(detail.reason["errorKind"], json!("FLAG_NOT_FOUND"));
    }

    #[test]
    fn secure_mode_hash_is_stable_for_the_same_key_and_context() {
        let store = store_with(bool_flag("demo"));
        let client = ClientBuilder::new("sdk-key", store).build().expect("builds");
        let ctx = Context::single("user", "u1", BTreeMap::new()).expect("valid context");

        let first = client.secure_mode_hash(&ctx);
        let second = client.secure_mode_hash(&ctx);
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn all_flags_state_includes_every_stored_flag() {
        let store = store_with(bool_flag("demo"));
        let client = ClientBuilder::new("sdk-key", store).build().expect("builds");
        let ctx = Context::single("user", "u1", BTreeMap::new()).expect("valid context");

        let state = client.all_flags_state(&ctx, crate::all_flags::AllFlagsOptions::default());
        assert!(state.valid);
        assert_eq!(state.flags["demo"].value, Value::Bool(true));
    }

    #[test]
    fn close_stops_cleanly_with_no_configured_components() {
        let store = store_with(bool_flag("demo"));
        let client = ClientBuilder::new("sdk-key", store).build().expect("builds");
        client.flush();
        client.close();
    }
}
