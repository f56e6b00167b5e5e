// crates/flagline-datasource/src/streaming.rs
// ============================================================================
// Module: Streaming Data Source
// Description: Maintains a long-lived server-sent-events connection and
//              applies `put`/`patch`/`delete` updates to a `DataStore`.
// Purpose: The primary, low-latency replication strategy; falls back to
//          reconnect-with-backoff on any transport hiccup.
// Dependencies: flagline-core, reqwest (blocking), serde_json, url
// ============================================================================

//! ## Overview
//! Blocking `reqwest` has no async byte stream, and the workspace carries no
//! SSE crate, so this module reads the response body as a blocking
//! `BufRead` and hand-parses the text/event-stream framing itself: blank
//! lines terminate an event, `event:`/`data:`/`:`(comment) lines are the
//! only ones this control plane emits. Multi-line `data:` fields are
//! newline-joined per the SSE spec, though every event this control plane
//! sends fits on one line.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::BufRead;
use std::io::BufReader;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use flagline_core::DataKind;
use flagline_core::DataSourceState;
use flagline_core::DataSourceStatus;
use flagline_core::DataSourceStatusError;
use flagline_core::DataStore;
use flagline_core::Flag;
use flagline_core::Segment;
use flagline_core::StatusBroadcaster;
use flagline_core::StoredItem;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use reqwest::header::AUTHORIZATION;
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use url::Url;

use crate::backoff::Backoff;
use crate::changes::ChangeTracker;
use crate::changes::FlagChangeEvent;
use crate::error::DataSourceError;
use crate::http::HttpHostPolicy;
use crate::polling::ReadySignal;

/// Backoff resets to its initial delay after this long of continuous
/// connection.
const RESET_AFTER_CONNECTED: Duration = Duration::from_secs(60);

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for [`StreamingDataSource`].
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Base URI of the streaming endpoint's host.
    pub stream_uri: Url,
    /// SDK key sent as the `Authorization` header.
    pub sdk_key: String,
    /// Product string sent as `User-Agent`.
    pub user_agent: String,
    /// Optional `X-Flagline-Tags`-style application tag header value.
    pub application_tags: Option<String>,
    /// Optional reduced-payload filter, appended as `?filter=`.
    pub filter_key: Option<String>,
    /// Idle-read timeout; the control plane sends periodic comment lines as
    /// a heartbeat, so a read silence this long means the connection is
    /// dead.
    pub idle_timeout: Duration,
    /// Initial backoff delay after a dropped connection.
    pub initial_reconnect_delay: Duration,
    /// Maximum backoff delay after repeated dropped connections.
    pub max_reconnect_delay: Duration,
}

impl StreamingConfig {
    /// Builds a config with the documented defaults: a 5 minute idle
    /// timeout and 1s/30s backoff bounds.
    #[must_use]
    pub fn new(stream_uri: Url, sdk_key: impl Into<String>) -> Self {
        Self {
            stream_uri,
            sdk_key: sdk_key.into(),
            user_agent: "FlaglineServerSDK/1".to_owned(),
            application_tags: None,
            filter_key: None,
            idle_timeout: Duration::from_secs(5 * 60),
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }

    fn request_url(&self) -> Result<Url, DataSourceError> {
        let mut url = self
            .stream_uri
            .join("/all")
            .map_err(|err| DataSourceError::InvalidUri(err.to_string()))?;
        if let Some(filter) = &self.filter_key {
            url.query_pairs_mut().append_pair("filter", filter);
        }
        Ok(url)
    }
}

// ============================================================================
// SECTION: Wire Payloads
// ============================================================================

#[derive(Debug, Deserialize)]
struct PutPayload {
    #[serde(default)]
    flags: std::collections::BTreeMap<String, Flag>,
    #[serde(default)]
    segments: std::collections::BTreeMap<String, Segment>,
}

#[derive(Debug, Deserialize)]
struct PatchPayload {
    path: String,
    data: serde_json::Value,
    #[serde(default)]
    version: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DeletePayload {
    path: String,
    version: i64,
}

enum ParsedEvent {
    Put(PutPayload),
    Patch(PatchPayload),
    Delete(DeletePayload),
    Ignored,
}

/// One `(kind, key)` the `path` field of a patch/delete event names, e.g.
/// `/flags/my-flag` -> `(DataKind::Flags, "my-flag")`.
fn parse_path(path: &str) -> Option<(DataKind, &str)> {
    let trimmed = path.strip_prefix('/')?;
    let (segment, key) = trimmed.split_once('/')?;
    let kind = match segment {
        "flags" => DataKind::Flags,
        "segments" => DataKind::Segments,
        _ => return None,
    };
    Some((kind, key))
}

// ============================================================================
// SECTION: Streaming Data Source
// ============================================================================

/// A running streaming replicator.
pub struct StreamingDataSource {
    stop_flag: Arc<AtomicBool>,
    status: Arc<StatusBroadcaster<DataSourceStatus>>,
    join_handle: Option<JoinHandle<()>>,
}

impl StreamingDataSource {
    /// Starts the streaming loop on a background thread.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError`] if the HTTP client cannot be built.
    pub fn start<S, F>(
        config: StreamingConfig,
        policy: HttpHostPolicy,
        store: Arc<S>,
        on_change: F,
        ready: std::sync::mpsc::SyncSender<ReadySignal>,
    ) -> Result<Self, DataSourceError>
    where
        S: DataStore + 'static,
        F: Fn(Vec<FlagChangeEvent>) + Send + 'static,
    {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| DataSourceError::Transport(err.to_string()))?;

        let stop_flag = Arc::new(AtomicBool::new(false));
        let status = Arc::new(StatusBroadcaster::new(DataSourceStatus::initializing(crate::now_ms())));

        let thread_stop = Arc::clone(&stop_flag);
        let thread_status = Arc::clone(&status);
        let join_handle = thread::spawn(move || {
            run_stream_loop(config, policy, client, store, thread_stop, thread_status, on_change, ready);
        });

        Ok(Self { stop_flag, status, join_handle: Some(join_handle) })
    }

    /// Returns the current data source status.
    #[must_use]
    pub fn status(&self) -> DataSourceStatus {
        self.status.current()
    }

    /// Signals the streaming thread to stop and waits for it to exit.
    pub fn stop(mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

#[allow(clippy::too_many_arguments, reason = "a single-purpose background loop; splitting its setup across structs would scatter state that belongs together")]
fn run_stream_loop<S, F>(
    config: StreamingConfig,
    policy: HttpHostPolicy,
    client: Client,
    store: Arc<S>,
    stop_flag: Arc<AtomicBool>,
    status: Arc<StatusBroadcaster<DataSourceStatus>>,
    on_change: F,
    ready: std::sync::mpsc::SyncSender<ReadySignal>,
) where
    S: DataStore + 'static,
    F: Fn(Vec<FlagChangeEvent>) + Send + 'static,
{
    let mut backoff = Backoff::new(config.initial_reconnect_delay, config.max_reconnect_delay);
    let mut tracker = ChangeTracker::new();
    let mut signaled_ready = false;

    while !stop_flag.load(Ordering::SeqCst) {
        let connected_at = Instant::now();
        match run_connection(&config, &policy, &client, store.as_ref(), &mut tracker, &stop_flag, |changes| {
            on_change(changes);
            if !signaled_ready {
                signaled_ready = true;
                let _ = ready.try_send(ReadySignal { initialized: true });
            }
            status.publish(DataSourceStatus {
                state: DataSourceState::Valid,
                error: None,
                since_ms: crate::now_ms(),
            });
        }) {
            Ok(()) => {
                if stop_flag.load(Ordering::SeqCst) {
                    break;
                }
                status.publish(DataSourceStatus {
                    state: DataSourceState::Interrupted,
                    error: None,
                    since_ms: crate::now_ms(),
                });
            }
            Err(err) if err.is_unrecoverable() => {
                status.publish(DataSourceStatus {
                    state: DataSourceState::Off,
                    error: Some(classify(&err)),
                    since_ms: crate::now_ms(),
                });
                if !signaled_ready {
                    signaled_ready = true;
                    let _ = ready.try_send(ReadySignal { initialized: false });
                }
                break;
            }
            Err(err) => {
                status.publish(DataSourceStatus {
                    state: DataSourceState::Interrupted,
                    error: Some(classify(&err)),
                    since_ms: crate::now_ms(),
                });
            }
        }

        if connected_at.elapsed() >= RESET_AFTER_CONNECTED {
            backoff.reset();
        }
        if stop_flag.load(Ordering::SeqCst) {
            break;
        }
        sleep_or_stop(&stop_flag, backoff.next_delay());
    }
}

fn sleep_or_stop(stop_flag: &AtomicBool, total: Duration) {
    let step = Duration::from_millis(200);
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if stop_flag.load(Ordering::SeqCst) {
            return;
        }
        let slice = step.min(remaining);
        thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
}

fn classify(err: &DataSourceError) -> DataSourceStatusError {
    match err {
        DataSourceError::HttpStatus { status } => DataSourceStatusError::HttpStatus { status: *status },
        DataSourceError::InvalidData(message) => DataSourceStatusError::InvalidData(message.clone()),
        other => DataSourceStatusError::NetworkError(other.to_string()),
    }
}

/// Opens one connection and processes events from it until the connection
/// drops, an unrecoverable status is seen, or `stop_flag` is set.
fn run_connection<S: DataStore>(
    config: &StreamingConfig,
    policy: &HttpHostPolicy,
    client: &Client,
    store: &S,
    tracker: &mut ChangeTracker,
    stop_flag: &AtomicBool,
    mut on_sync: impl FnMut(Vec<FlagChangeEvent>),
) -> Result<(), DataSourceError> {
    let url = config.request_url()?;
    policy.enforce(&url)?;

    let mut request = client
        .get(url.as_str())
        .header(AUTHORIZATION, config.sdk_key.as_str())
        .header(USER_AGENT, config.user_agent.as_str())
        .header(ACCEPT, "text/event-stream");
    if let Some(tags) = &config.application_tags {
        request = request.header("X-Flagline-Tags", tags.as_str());
    }

    let response = request.send().map_err(|err| DataSourceError::Transport(err.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(DataSourceError::HttpStatus { status: status.as_u16() });
    }

    let mut reader = BufReader::new(response);
    let mut event_name = String::new();
    let mut data_lines: Vec<String> = Vec::new();

    loop {
        if stop_flag.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut line = String::new();
        let read = reader.read_line(&mut line).map_err(|err| DataSourceError::Transport(err.to_string()))?;
        if read == 0 {
            return Ok(());
        }
        let line = line.trim_end_matches(['\n', '\r']);

        if line.is_empty() {
            if !data_lines.is_empty() {
                let data = data_lines.join("\n");
                let parsed = parse_event(&event_name, &data)?;
                if let Some(changes) = apply_event(parsed, store, tracker)? {
                    on_sync(changes);
                }
            }
            event_name.clear();
            data_lines.clear();
            continue;
        }
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            event_name = value.trim().to_owned();
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim_start().to_owned());
        }
    }
}

fn parse_event(event_name: &str, data: &str) -> Result<ParsedEvent, DataSourceError> {
    match event_name {
        "put" => {
            let payload: PutPayload =
                serde_json::from_str(data).map_err(|err| DataSourceError::InvalidData(err.to_string()))?;
            Ok(ParsedEvent::Put(payload))
        }
        "patch" => {
            let payload: PatchPayload =
                serde_json::from_str(data).map_err(|err| DataSourceError::InvalidData(err.to_string()))?;
            Ok(ParsedEvent::Patch(payload))
        }
        "delete" => {
            let payload: DeletePayload =
                serde_json::from_str(data).map_err(|err| DataSourceError::InvalidData(err.to_string()))?;
            Ok(ParsedEvent::Delete(payload))
        }
        _ => Ok(ParsedEvent::Ignored),
    }
}

fn apply_event<S: DataStore>(
    event: ParsedEvent,
    store: &S,
    tracker: &mut ChangeTracker,
) -> Result<Option<Vec<FlagChangeEvent>>, DataSourceError> {
    match event {
        ParsedEvent::Put(payload) => {
            let flags: Vec<Flag> = payload.flags.into_values().collect();
            let segments: Vec<Segment> = payload.segments.into_values().collect();
            let changes = tracker.observe_init(&flags, &segments);

            let flag_items = flags
                .iter()
                .map(|flag| {
                    let value = serde_json::to_value(flag)
                        .map_err(|err| DataSourceError::InvalidData(err.to_string()))?;
                    Ok((flag.key.as_str().to_owned(), StoredItem::live(flag.version, value)))
                })
                .collect::<Result<Vec<_>, DataSourceError>>()?;
            let segment_items = segments
                .iter()
                .map(|segment| {
                    let value = serde_json::to_value(segment)
                        .map_err(|err| DataSourceError::InvalidData(err.to_string()))?;
                    Ok((segment.key.as_str().to_owned(), StoredItem::live(segment.version, value)))
                })
                .collect::<Result<Vec<_>, DataSourceError>>()?;

            store.init(flag_items, segment_items).map_err(|err| DataSourceError::Store(err.to_string()))?;
            Ok(Some(changes))
        }
        ParsedEvent::Patch(payload) => {
            let (kind, key) = parse_path(&payload.path)
                .ok_or_else(|| DataSourceError::InvalidData(format!("unrecognized path: {}", payload.path)))?;
            let version = payload.version.unwrap_or(0);
            let item = StoredItem::live(version, payload.data);
            apply_single_upsert(kind, key, item, store, tracker)
        }
        ParsedEvent::Delete(payload) => {
            let (kind, key) = parse_path(&payload.path)
                .ok_or_else(|| DataSourceError::InvalidData(format!("unrecognized path: {}", payload.path)))?;
            let item = StoredItem::tombstone(payload.version);
            apply_single_upsert(kind, key, item, store, tracker)
        }
        ParsedEvent::Ignored => Ok(None),
    }
}

fn apply_single_upsert<S: DataStore>(
    kind: DataKind,
    key: &str,
    item: StoredItem,
    store: &S,
    tracker: &mut ChangeTracker,
) -> Result<Option<Vec<FlagChangeEvent>>, DataSourceError> {
    let typed_value = item.data.clone();
    store.upsert(kind, key, item).map_err(|err| DataSourceError::Store(err.to_string()))?;

    let changes = match kind {
        DataKind::Flags => {
            let flag = typed_value
                .map(serde_json::from_value::<Flag>)
                .transpose()
                .map_err(|err| DataSourceError::InvalidData(err.to_string()))?;
            tracker.observe_flag_upsert(key, flag.as_ref())
        }
        DataKind::Segments => {
            let segment = typed_value
                .map(serde_json::from_value::<Segment>)
                .transpose()
                .map_err(|err| DataSourceError::InvalidData(err.to_string()))?;
            tracker.observe_segment_upsert(key, segment.as_ref())
        }
    };
    Ok(Some(changes))
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
    fn parse_path_splits_kind_and_key() {
        assert_eq!(parse_path("/flags/dark-mode"), Some((DataKind::Flags, "dark-mode")));
        assert_eq!(parse_path("/segments/beta"), Some((DataKind::Segments, "beta")));
        assert_eq!(parse_path("/unknown/x"), None);
        assert_eq!(parse_path("no-leading-slash"), None);
    }

    #[test]
    fn parse_event_ignores_unknown_event_names() {
        let parsed = parse_event("heartbeat", "{}").expect("no parse error");
        assert!(matches!(parsed, ParsedEvent::Ignored));
    }

    #[test]
    fn parse_event_rejects_malformed_put_payload() {
        let result = parse_event("put", "not json");
        assert!(result.is_err());
    }
}
