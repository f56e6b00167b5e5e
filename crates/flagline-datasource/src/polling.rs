// crates/flagline-datasource/src/polling.rs
// ============================================================================
// Module: Polling Data Source
// Description: Fetches a full flag/segment snapshot at a fixed interval and
//              replicates it into a `DataStore`.
// Purpose: The fallback (and, for hosts that prefer it, primary) replication
//          strategy when a persistent streaming connection isn't wanted.
// Dependencies: flagline-core, reqwest (blocking), serde_json, url
// ============================================================================

//! ## Overview
//! [`PollingDataSource::start`] spawns one background OS thread that loops:
//! fetch the full snapshot, apply it to the store, compute flag-change
//! notifications, publish status, sleep until the next tick (or wake early
//! on `stop()`). Backoff only applies to *failed* fetches; a successful poll
//! always waits the full `poll_interval`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

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
use reqwest::header::ACCEPT_ENCODING;
use reqwest::header::AUTHORIZATION;
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use url::Url;

use crate::backoff::Backoff;
use crate::changes::ChangeTracker;
use crate::changes::FlagChangeEvent;
use crate::error::DataSourceError;
use crate::http::HttpHostPolicy;
use crate::http::read_capped;

/// The lowest interval the polling data source will honor, matching the
/// control plane's documented floor.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(30);

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for [`PollingDataSource`].
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Base URI of the polling endpoint's host, e.g. `https://sdk.example.com`.
    pub base_uri: Url,
    /// SDK key sent as the `Authorization` header.
    pub sdk_key: String,
    /// Product string sent as `User-Agent`.
    pub user_agent: String,
    /// Optional reduced-payload filter, appended as `?filter=`.
    pub filter_key: Option<String>,
    /// Interval between successful polls; clamped up to [`MIN_POLL_INTERVAL`].
    pub poll_interval: Duration,
    /// Per-request socket timeout.
    pub request_timeout: Duration,
    /// Maximum accepted response body size.
    pub max_response_bytes: usize,
    /// Initial backoff delay after a failed poll.
    pub initial_reconnect_delay: Duration,
    /// Maximum backoff delay after repeated failed polls.
    pub max_reconnect_delay: Duration,
}

impl PollingConfig {
    /// Builds a config with the documented defaults: a 30s poll interval,
    /// a 10s request timeout, a 1 MiB response cap, and 1s/30s backoff
    /// bounds.
    #[must_use]
    pub fn new(base_uri: Url, sdk_key: impl Into<String>) -> Self {
        Self {
            base_uri,
            sdk_key: sdk_key.into(),
            user_agent: "FlaglineServerSDK/1".to_owned(),
            filter_key: None,
            poll_interval: MIN_POLL_INTERVAL,
            request_timeout: Duration::from_secs(10),
            max_response_bytes: 1024 * 1024,
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }

    /// Sets the poll interval, clamped up to [`MIN_POLL_INTERVAL`].
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    fn request_url(&self) -> Result<Url, DataSourceError> {
        let mut url = self
            .base_uri
            .join("/sdk/latest-all")
            .map_err(|err| DataSourceError::InvalidUri(err.to_string()))?;
        if let Some(filter) = &self.filter_key {
            url.query_pairs_mut().append_pair("filter", filter);
        }
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotPayload {
    #[serde(default)]
    flags: std::collections::BTreeMap<String, Flag>,
    #[serde(default)]
    segments: std::collections::BTreeMap<String, Segment>,
}

// ============================================================================
// SECTION: Ready Signal
// ============================================================================

/// Fired once, either after the first successful sync or after an
/// unrecoverable error disables the data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadySignal {
    /// Whether the data source reached a usable, initialized state.
    pub initialized: bool,
}

// ============================================================================
// SECTION: Polling Data Source
// ============================================================================

/// A running polling replicator; dropping this without calling [`Self::stop`]
/// detaches the background thread (it still observes the shared stop flag,
/// but nothing will join it).
pub struct PollingDataSource {
    stop_flag: Arc<AtomicBool>,
    status: Arc<StatusBroadcaster<DataSourceStatus>>,
    join_handle: Option<JoinHandle<()>>,
}

impl PollingDataSource {
    /// Starts the polling loop on a background thread.
    ///
    /// `on_change` is invoked (off the caller's thread) with the set of
    /// flags whose evaluation may have changed after each successful poll.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError`] if the HTTP client cannot be built.
    pub fn start<S, F>(
        config: PollingConfig,
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
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| DataSourceError::Transport(err.to_string()))?;

        let stop_flag = Arc::new(AtomicBool::new(false));
        let status = Arc::new(StatusBroadcaster::new(DataSourceStatus::initializing(now_ms())));

        let thread_stop = Arc::clone(&stop_flag);
        let thread_status = Arc::clone(&status);
        let join_handle = thread::spawn(move || {
            run_poll_loop(
                config,
                policy,
                client,
                store,
                thread_stop,
                thread_status,
                on_change,
                ready,
            );
        });

        Ok(Self { stop_flag, status, join_handle: Some(join_handle) })
    }

    /// Returns the current data source status.
    #[must_use]
    pub fn status(&self) -> DataSourceStatus {
        self.status.current()
    }

    /// Signals the polling thread to stop and waits for it to exit.
    pub fn stop(mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

#[allow(clippy::too_many_arguments, reason = "a single-purpose background loop; splitting its setup across structs would scatter state that belongs together")]
fn run_poll_loop<S, F>(
    config: PollingConfig,
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
        match poll_once(&config, &policy, &client, store.as_ref(), &mut tracker) {
            Ok(changes) => {
                backoff.reset();
                status.publish(DataSourceStatus {
                    state: DataSourceState::Valid,
                    error: None,
                    since_ms: crate::now_ms(),
                });
                on_change(changes);
                if !signaled_ready {
                    signaled_ready = true;
                    let _ = ready.try_send(ReadySignal { initialized: true });
                }
                sleep_or_stop(&stop_flag, config.poll_interval);
            }
            Err(err) if is_unrecoverable(&err) => {
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
                sleep_or_stop(&stop_flag, backoff.next_delay());
            }
        }
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

fn is_unrecoverable(err: &DataSourceError) -> bool {
    err.is_unrecoverable()
}

fn classify(err: &DataSourceError) -> DataSourceStatusError {
    match err {
        DataSourceError::HttpStatus { status } => DataSourceStatusError::HttpStatus { status: *status },
        DataSourceError::InvalidData(message) => DataSourceStatusError::InvalidData(message.clone()),
        other => DataSourceStatusError::NetworkError(other.to_string()),
    }
}

fn poll_once<S: DataStore>(
    config: &PollingConfig,
    policy: &HttpHostPolicy,
    client: &Client,
    store: &S,
    tracker: &mut ChangeTracker,
) -> Result<Vec<FlagChangeEvent>, DataSourceError> {
    let url = config.request_url()?;
    policy.enforce(&url)?;

    let response = client
        .get(url.as_str())
        .header(AUTHORIZATION, config.sdk_key.as_str())
        .header(USER_AGENT, config.user_agent.as_str())
        .header(ACCEPT_ENCODING, "gzip")
        .send()
        .map_err(|err| DataSourceError::Transport(err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(DataSourceError::HttpStatus { status: status.as_u16() });
    }

    let max_bytes = config.max_response_bytes;
    let body = read_capped(BlockingBody(response), max_bytes)?;
    let payload: SnapshotPayload = serde_json::from_slice(&body)
        .map_err(|err| DataSourceError::InvalidData(err.to_string()))?;

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

    store
        .init(flag_items, segment_items)
        .map_err(|err| DataSourceError::Store(err.to_string()))?;

    Ok(changes)
}

/// Adapts `reqwest::blocking::Response` to `std::io::Read` by value, since
/// `read_capped` takes an owned reader it can wrap in `.take(...)`.
struct BlockingBody(reqwest::blocking::Response);

impl Read for BlockingBody {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
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
    use crate::http::HttpHostPolicy;

    #[test]
    fn poll_interval_is_clamped_to_the_floor() {
        let url = Url::parse("https://sdk.example.com").expect("valid url");
        let config = PollingConfig::new(url, "key").with_poll_interval(Duration::from_secs(1));
        assert_eq!(config.poll_interval, MIN_POLL_INTERVAL);
    }

    #[test]
    fn request_url_appends_filter_query() {
        let url = Url::parse("https://sdk.example.com").expect("valid url");
        let config = PollingConfig::new(url, "key");
        let mut filtered = config.clone();
        filtered.filter_key = Some("mobile".to_owned());
        let request_url = filtered.request_url().expect("buildable");
        assert!(request_url.as_str().contains("filter=mobile"));
    }

    #[test]
    fn poll_against_a_local_http_server_initializes_the_store() {
        use flagline_store::MemoryDataStore;

        let server = tiny_http::Server::http("127.0.0.1:0").expect("bind local server");
        let port = server.server_addr().to_ip().expect("ip addr").port();
        let body = serde_json::json!({
            "flags": {
                "a": {
                    "key": "a",
                    "version": 1,
                    "on": true,
                    "variations": [false, true],
                    "fallthrough": {"variation": 1},
                    "salt": "s"
                }
            },
            "segments": {}
        })
        .to_string();

        let handle = thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let response = tiny_http::Response::from_string(body)
                    .with_status_code(200);
                let _ = request.respond(response);
            }
        });

        let base = Url::parse(&format!("http://127.0.0.1:{port}")).expect("valid url");
        let config = PollingConfig::new(base, "key");
        let policy = HttpHostPolicy::new().allow_private_networks();
        let store = Arc::new(MemoryDataStore::new());
        let mut tracker = ChangeTracker::new();
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(5))
            .build()
            .expect("client");

        let changes = poll_once(&config, &policy, &client, store.as_ref(), &mut tracker)
            .expect("poll succeeds");
        assert_eq!(changes, vec![FlagChangeEvent { key: "a".to_owned() }]);
        assert!(store.get(DataKind::Flags, "a").expect("readable").is_some());

        handle.join().expect("server thread joins");
    }
}
