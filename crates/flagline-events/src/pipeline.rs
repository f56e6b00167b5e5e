// crates/flagline-events/src/pipeline.rs
// ============================================================================
// Module: Event Pipeline
// Description: The bounded-queue producer/consumer that turns submitted
//              evaluations into redacted, summarized, delivered payloads.
// Purpose: Give the client core one cheap, non-blocking `submit` call while
//          all summarization, redaction, and delivery happens off-thread.
// Dependencies: flagline-core, rand, serde_json, time
// ============================================================================

//! ## Overview
//! One consumer thread owns the summary table, the seen-context tracker, and
//! the delivery sender; callers only ever touch a cloned [`SyncSender`]
//! through [`EventPipeline::submit`]. A full queue drops the event rather
//! than blocking the caller, the way a bounded queue that prioritizes the
//! hot path over delivery completeness must. A separate timer thread drives
//! the periodic flush and, on a much longer interval, the diagnostic
//! side channel.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::mpsc::SyncSender;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use flagline_core::Context;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::Value;
use serde_json::json;

use crate::diagnostics::DiagnosticCounters;
use crate::diagnostics::DiagnosticId;
use crate::model::EvaluationEvent;
use crate::model::InputEvent;
use crate::model::OutputEvent;
use crate::now_ms;
use crate::redact::PrivacyConfig;
use crate::redact::redact_context;
use crate::sampling::should_sample;
use crate::sender::EventSender;
use crate::seen::SeenContexts;
use crate::summary::SummaryTable;

/// Default bound on the number of queued, not-yet-processed submissions.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
/// Default interval between payload flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
/// Default seen-context tracker capacity.
pub const DEFAULT_SEEN_CAPACITY: usize = 1_000;
/// Default seen-context time-to-live.
pub const DEFAULT_SEEN_TTL: Duration = Duration::from_secs(5 * 60);

/// Configuration for an [`EventPipeline`].
#[derive(Debug, Clone)]
pub struct EventPipelineConfig {
    /// Bound on queued, not-yet-processed submissions.
    pub capacity: usize,
    /// Interval between automatic flushes.
    pub flush_interval: Duration,
    /// Seen-context tracker capacity.
    pub seen_capacity: usize,
    /// Seen-context time-to-live.
    pub seen_ttl: Duration,
    /// Interval between diagnostic side-channel events.
    pub diagnostics_interval: Duration,
    /// Privacy settings applied to every outbound context.
    pub privacy: PrivacyConfig,
    /// Whether diagnostic events are sent at all.
    pub diagnostics_enabled: bool,
}

impl Default for EventPipelineConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            seen_capacity: DEFAULT_SEEN_CAPACITY,
            seen_ttl: DEFAULT_SEEN_TTL,
            diagnostics_interval: crate::diagnostics::DEFAULT_DIAGNOSTIC_INTERVAL,
            privacy: PrivacyConfig::default(),
            diagnostics_enabled: true,
        }
    }
}

enum PipelineMessage {
    Submit(InputEvent),
    Flush(mpsc::Sender<()>),
    Close(mpsc::Sender<()>),
}

/// The running event pipeline: a queue, a consumer thread, and a timer
/// thread driving flush and diagnostic cadence.
pub struct EventPipeline {
    sender: SyncSender<PipelineMessage>,
    counters: Arc<DiagnosticCounters>,
    timer_stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

impl EventPipeline {
    /// Starts the consumer and timer threads.
    #[must_use]
    pub fn start(config: EventPipelineConfig, delivery: Arc<EventSender>, diagnostic_id: DiagnosticId) -> Self {
        let (sender, receiver) = mpsc::sync_channel(config.capacity.max(1));
        let counters = Arc::new(DiagnosticCounters::new());

        let worker_counters = Arc::clone(&counters);
        let worker_config = config.clone();
        let timer_delivery = Arc::clone(&delivery);
        let worker = thread::spawn(move || run_consumer(receiver, worker_config, delivery, worker_counters));

        let timer_stop = Arc::new(AtomicBool::new(false));
        let timer_sender = sender.clone();
        let timer_stop_flag = Arc::clone(&timer_stop);
        let timer_counters = Arc::clone(&counters);
        let timer_config = config.clone();
        let timer = thread::spawn(move || {
            run_timer(&timer_sender, &timer_stop_flag, &timer_config, &diagnostic_id, &timer_counters, &timer_delivery);
        });

        Self { sender, counters, timer_stop, worker: Some(worker), timer: Some(timer) }
    }

    /// Submits an event for eventual summarization and delivery.
    ///
    /// Returns `false` if the queue was full and the event was dropped.
    pub fn submit(&self, event: InputEvent) -> bool {
        match self.sender.try_send(PipelineMessage::Submit(event)) {
            Ok(()) => true,
            Err(_full_or_disconnected) => {
                self.counters.record_dropped_event();
                false
            }
        }
    }

    /// Forces an immediate flush, blocking until the consumer thread has
    /// processed it.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.sender.send(PipelineMessage::Flush(ack_tx)).is_ok() {
            let _ignored = ack_rx.recv();
        }
    }

    /// Flushes one final time, then stops both background threads.
    pub fn close(mut self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.sender.send(PipelineMessage::Close(ack_tx)).is_ok() {
            let _ignored = ack_rx.recv();
        }
        self.timer_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ignored = handle.join();
        }
        if let Some(handle) = self.timer.take() {
            let _ignored = handle.join();
        }
    }
}

// ============================================================================
// SECTION: Consumer
// ============================================================================

struct ConsumerState {
    config: EventPipelineConfig,
    summary: SummaryTable,
    seen: SeenContexts,
    rng: StdRng,
    buffer: Vec<OutputEvent>,
    delivery: Arc<EventSender>,
}

fn run_consumer(
    receiver: mpsc::Receiver<PipelineMessage>,
    config: EventPipelineConfig,
    delivery: Arc<EventSender>,
    counters: Arc<DiagnosticCounters>,
) {
    let mut state = ConsumerState {
        seen: SeenContexts::new(config.seen_capacity, config.seen_ttl),
        rng: StdRng::from_entropy(),
        summary: SummaryTable::new(),
        buffer: Vec::new(),
        delivery,
        config,
    };

    for message in &receiver {
        match message {
            PipelineMessage::Submit(event) => {
                handle_submit(&mut state, event);
                counters.set_events_in_queue(state.buffer.len() as u64);
            }
            PipelineMessage::Flush(ack) => {
                flush_buffer(&mut state);
                let _ignored = ack.send(());
            }
            PipelineMessage::Close(ack) => {
                flush_buffer(&mut state);
                let _ignored = ack.send(());
                break;
            }
        }
    }
}

fn handle_submit(state: &mut ConsumerState, event: InputEvent) {
    let now = now_ms();
    let context = event.context().clone();
    note_first_sighting(state, &context, now);

    match event {
        InputEvent::Evaluation(evaluation) => handle_evaluation(state, &evaluation, &context, now),
        InputEvent::Identify { context, creation_date } => {
            state
                .buffer
                .push(OutputEvent::Identify { creation_date, context: redact_context(&context, &state.config.privacy) });
        }
        InputEvent::Custom { key, context, data, metric_value, creation_date } => {
            state.buffer.push(OutputEvent::Custom {
                creation_date,
                key,
                context: redact_context(&context, &state.config.privacy),
                data,
                metric_value,
            });
        }
        InputEvent::MigrationOp(op) => {
            if !should_sample(op.sampling_ratio, &mut state.rng) {
                return;
            }
            let context_kinds = context.kinds();
            state.summary.record(&op.evaluation, &context_kinds, now);
            let evaluation_value = evaluation_value(&op.evaluation, &context, &state.config.privacy);
            state.buffer.push(OutputEvent::MigrationOp {
                creation_date: op.creation_date,
                operation: op.operation,
                evaluation: evaluation_value,
                measurements: op.measurements,
                sampling_ratio: op.sampling_ratio,
            });
        }
    }
}

fn handle_evaluation(state: &mut ConsumerState, evaluation: &EvaluationEvent, context: &Context, now: i64) {
    if !should_sample(evaluation.sampling_ratio, &mut state.rng) {
        return;
    }
    let context_kinds = context.kinds();
    state.summary.record(evaluation, &context_kinds, now);

    let in_debug_window = evaluation.debug_events_until_date.is_some_and(|deadline| now < deadline);
    if !evaluation.track_events && !in_debug_window {
        return;
    }

    state.buffer.push(OutputEvent::Feature {
        creation_date: evaluation.creation_date,
        key: evaluation.flag_key.clone(),
        context: redact_context(context, &state.config.privacy),
        value: evaluation.value.clone(),
        variation: evaluation.variation_index,
        default: evaluation.default.clone(),
        version: evaluation.flag_version,
        reason: evaluation.reason.clone(),
        prereq_of: evaluation.prereq_of.clone(),
        sampling_ratio: evaluation.sampling_ratio,
        track_events: Some(evaluation.track_events),
    });
}

fn evaluation_value(evaluation: &EvaluationEvent, context: &Context, privacy: &PrivacyConfig) -> Value {
    json!({
        "key": evaluation.flag_key,
        "context": redact_context(context, privacy),
        "value": evaluation.value,
        "variation": evaluation.variation_index,
        "default": evaluation.default,
        "version": evaluation.flag_version,
        "reason": evaluation.reason,
    })
}

fn note_first_sighting(state: &mut ConsumerState, context: &Context, now: i64) {
    let key = context.fully_qualified_key();
    if !state.seen.observe(&key, Instant::now()) {
        return;
    }
    if state.config.privacy.omit_anonymous_contexts && context.fully_anonymous() {
        return;
    }
    state.buffer.push(OutputEvent::Index { creation_date: now, context: redact_context(context, &state.config.privacy) });
}

fn flush_buffer(state: &mut ConsumerState) {
    let now = now_ms();
    if let Some(summary) = state.summary.flush(now) {
        state.buffer.push(summary);
    }
    if state.buffer.is_empty() {
        return;
    }
    let payload = std::mem::take(&mut state.buffer);
    if let Err(err) = state.delivery.send(&payload) {
        if !err.is_permanent() {
            // A single retry already happened inside `send`; a transient
            // failure past that point drops this batch rather than
            // buffering it indefinitely.
        }
    }
}

// ============================================================================
// SECTION: Timer
// ============================================================================

fn run_timer(
    sender: &SyncSender<PipelineMessage>,
    stop: &AtomicBool,
    config: &EventPipelineConfig,
    diagnostic_id: &DiagnosticId,
    counters: &DiagnosticCounters,
    delivery: &EventSender,
) {
    let flush_interval = config.flush_interval.max(Duration::from_millis(1));
    let diagnostics_interval = crate::diagnostics::clamp_interval(config.diagnostics_interval);

    if config.diagnostics_enabled {
        let init_document = DiagnosticCounters::init_document(diagnostic_id, now_ms());
        let _ignored = delivery.send_diagnostic(&init_document);
    }

    let mut elapsed_since_diagnostic = Duration::ZERO;
    let step = Duration::from_millis(200).min(flush_interval);
    let mut elapsed_since_flush = Duration::ZERO;

    while !stop.load(Ordering::SeqCst) {
        thread::sleep(step);
        elapsed_since_flush += step;
        elapsed_since_diagnostic += step;

        if elapsed_since_flush >= flush_interval {
            elapsed_since_flush = Duration::ZERO;
            let (ack_tx, _ack_rx) = mpsc::channel();
            let _ignored = sender.try_send(PipelineMessage::Flush(ack_tx));
        }

        if config.diagnostics_enabled && elapsed_since_diagnostic >= diagnostics_interval {
            elapsed_since_diagnostic = Duration::ZERO;
            let period_ms = i64::try_from(diagnostics_interval.as_millis()).unwrap_or(i64::MAX);
            let document = counters.flush_periodic(diagnostic_id, now_ms(), period_ms);
            // Diagnostics ship on a side channel, independent of the main
            // event queue, so a full queue never delays them.
            let _ignored = delivery.send_diagnostic(&document);
        }
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
    use std::thread;

    use serde_json::json;
    use url::Url;

    use super::*;

    fn single_context(key: &str) -> Context {
        Context::single("user", key, BTreeMap::new()).expect("valid context")
    }

    fn sample_evaluation(key: &str, context: Context) -> EvaluationEvent {
        EvaluationEvent {
            flag_key: key.to_owned(),
            flag_version: Some(1),
            context,
            value: json!(true),
            variation_index: Some(0),
            default: json!(false),
            reason: None,
            prereq_of: None,
            sampling_ratio: None,
            track_events: true,
            debug_events_until_date: None,
            exclude_from_summaries: false,
            creation_date: 1_000,
        }
    }

    #[test]
    fn first_evaluation_emits_index_and_feature_then_flushes() {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("bind");
        let port = server.server_addr().to_ip().expect("ip").port();
        let handle = thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let mut body = String::new();
                let mut request = request;
                std::io::Read::read_to_string(request.as_reader(), &mut body).expect("read body");
                let response = tiny_http::Response::from_string("ok").with_status_code(202);
                let _ = request.respond(response);
                body
            } else {
                String::new()
            }
        });

        let url = Url::parse(&format!("http://127.0.0.1:{port}/")).expect("url");
        let delivery = Arc::new(EventSender::new(url, "key").expect("sender"));
        let config = EventPipelineConfig { diagnostics_enabled: false, ..EventPipelineConfig::default() };
        let pipeline = EventPipeline::start(config, delivery, DiagnosticId::new("sdk-123456"));

        let context = single_context("a");
        assert!(pipeline.submit(InputEvent::Evaluation(sample_evaluation("flag", context))));
        pipeline.flush();
        pipeline.close();

        let body = handle.join().expect("server thread joins");
        assert!(body.contains("\"index\""));
        assert!(body.contains("\"feature\""));
    }

    #[test]
    fn omit_anonymous_contexts_suppresses_the_index_event() {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("bind");
        let port = server.server_addr().to_ip().expect("ip").port();
        let handle = thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let mut body = String::new();
                let mut request = request;
                std::io::Read::read_to_string(request.as_reader(), &mut body).expect("read body");
                let response = tiny_http::Response::from_string("ok").with_status_code(202);
                let _ = request.respond(response);
                body
            } else {
                String::new()
            }
        });

        let url = Url::parse(&format!("http://127.0.0.1:{port}/")).expect("url");
        let delivery = Arc::new(EventSender::new(url, "key").expect("sender"));
        let privacy = PrivacyConfig { omit_anonymous_contexts: true, ..PrivacyConfig::default() };
        let config = EventPipelineConfig { diagnostics_enabled: false, privacy, ..EventPipelineConfig::default() };
        let pipeline = EventPipeline::start(config, delivery, DiagnosticId::new("sdk-123456"));

        let mut context = single_context("anon-1");
        if let Context::Single(part) = &mut context {
            part.anonymous = true;
        }
        assert!(pipeline.submit(InputEvent::Evaluation(sample_evaluation("flag", context))));
        pipeline.flush();
        pipeline.close();

        let body = handle.join().expect("server thread joins");
        assert!(!body.contains("\"index\""));
        assert!(body.contains("\"feature\""));
    }

    #[test]
    fn full_queue_drops_rather_than_blocks() {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("bind");
        let port = server.server_addr().to_ip().expect("ip").port();
        thread::spawn(move || {
            while let Ok(request) = server.recv() {
                let _ = request.respond(tiny_http::Response::from_string("ok").with_status_code(202));
            }
        });

        let url = Url::parse(&format!("http://127.0.0.1:{port}/")).expect("url");
        let delivery = Arc::new(EventSender::new(url, "key").expect("sender"));
        let config = EventPipelineConfig {
            capacity: 1,
            diagnostics_enabled: false,
            flush_interval: Duration::from_secs(3_600),
            ..EventPipelineConfig::default()
        };
        let pipeline = EventPipeline::start(config, delivery, DiagnosticId::new("sdk-123456"));

        let mut accepted = 0;
        for i in 0..50 {
            let context = single_context(&format!("user-{i}"));
            if pipeline.submit(InputEvent::Evaluation(sample_evaluation("flag", context))) {
                accepted += 1;
            }
        }
        assert!(accepted <= 50);
        pipeline.close();
    }
}
