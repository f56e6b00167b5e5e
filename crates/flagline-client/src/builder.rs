// crates/flagline-client/src/builder.rs
// ============================================================================
// Module: Client Builder
// Description: Composes an evaluator, data store, data source, event
//              pipeline, and big segment bridge into one `Client`.
// Purpose: Let a host wire up the pieces it wants (or accept in-process
//          defaults) without the client core knowing about a config-file
//          format or environment parsing of its own.
// Dependencies: flagline-core, flagline-datasource, flagline-events
// ============================================================================

//! ## Overview
//! The builder accepts already-built component configuration (a
//! [`StreamingConfig`] or [`PollingConfig`], an events URI, a big segment
//! provider) and constructs the running components in dependency order:
//! data store first (already owned by the caller), then the data source,
//! then the event pipeline. `build` blocks up to `start_wait` for the data
//! source's first successful sync before returning, the same "wait, then
//! hand back whether it's actually ready" contract the data source's own
//! ready channel implements.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use flagline_core::BigSegmentsProvider;
use flagline_core::DataStore;
use flagline_datasource::HttpHostPolicy;
use flagline_datasource::PollingConfig;
use flagline_datasource::PollingDataSource;
use flagline_datasource::StreamingConfig;
use flagline_datasource::StreamingDataSource;
use flagline_events::DiagnosticId;
use flagline_events::EventPipeline;
use flagline_events::EventPipelineConfig;
use flagline_events::EventSender;
use url::Url;

use crate::client::Client;
use crate::error::ClientError;
use crate::source::DataSourceHandle;

/// Default grace period `build` waits for the data source's first sync
/// before returning with `is_initialized() == false`.
pub const DEFAULT_START_WAIT: Duration = Duration::from_secs(5);

/// Which replication transport, if any, the builder was told to start.
enum DataSourceChoice {
    /// Replicate over a persistent streaming connection.
    Streaming(StreamingConfig),
    /// Replicate by polling at a fixed interval.
    Polling(PollingConfig),
    /// Don't start a data source; rely on the store's existing contents.
    None,
}

/// Builds a [`Client`] from a data store and whichever other components the
/// caller configures.
pub struct ClientBuilder<S: DataStore + 'static> {
    sdk_key: String,
    store: Arc<S>,
    data_source: DataSourceChoice,
    host_policy: HttpHostPolicy,
    big_segments: Option<Arc<dyn BigSegmentsProvider>>,
    events_uri: Option<Url>,
    event_config: EventPipelineConfig,
    start_wait: Duration,
    offline: bool,
}

impl<S: DataStore + 'static> ClientBuilder<S> {
    /// Starts a builder over an already-constructed data store.
    #[must_use]
    pub fn new(sdk_key: impl Into<String>, store: Arc<S>) -> Self {
        Self {
            sdk_key: sdk_key.into(),
            store,
            data_source: DataSourceChoice::None,
            host_policy: HttpHostPolicy::new(),
            big_segments: None,
            events_uri: None,
            event_config: EventPipelineConfig::default(),
            start_wait: DEFAULT_START_WAIT,
            offline: false,
        }
    }

    /// Replicates flags and segments over a persistent streaming connection.
    #[must_use]
    pub fn streaming(mut self, config: StreamingConfig) -> Self {
        self.data_source = DataSourceChoice::Streaming(config);
        self
    }

    /// Replicates flags and segments by polling at a fixed interval.
    #[must_use]
    pub fn polling(mut self, config: PollingConfig) -> Self {
        self.data_source = DataSourceChoice::Polling(config);
        self
    }

    /// Overrides the default outbound host policy applied to data source
    /// requests.
    #[must_use]
    pub fn host_policy(mut self, policy: HttpHostPolicy) -> Self {
        self.host_policy = policy;
        self
    }

    /// Resolves unbounded segment membership through the given provider.
    #[must_use]
    pub fn big_segments(mut self, provider: Arc<dyn BigSegmentsProvider>) -> Self {
        self.big_segments = Some(provider);
        self
    }

    /// Enables event delivery to `events_uri`.
    #[must_use]
    pub fn events(mut self, events_uri: Url) -> Self {
        self.events_uri = Some(events_uri);
        self
    }

    /// Overrides the default event pipeline configuration.
    #[must_use]
    pub fn event_config(mut self, config: EventPipelineConfig) -> Self {
        self.event_config = config;
        self
    }

    /// Overrides how long `build` waits for the data source's first sync.
    #[must_use]
    pub fn start_wait(mut self, duration: Duration) -> Self {
        self.start_wait = duration;
        self
    }

    /// Puts the client in offline mode: every evaluation serves its
    /// default and no events are generated, regardless of any other
    /// configuration.
    #[must_use]
    pub const fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// Builds and starts the client.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::DataSource`] if a configured data source fails
    /// to start, or [`ClientError::Events`] if event delivery is enabled
    /// but the HTTP client cannot be built.
    pub fn build(self) -> Result<Client<S>, ClientError> {
        if self.offline {
            return Ok(Client::assemble(self.sdk_key, self.store, None, None, None, true, true));
        }

        let events = match self.events_uri {
            Some(events_uri) => {
                let sender = Arc::new(EventSender::new(events_uri, self.sdk_key.clone())?);
                let diagnostic_id = DiagnosticId::new(&self.sdk_key);
                Some(EventPipeline::start(self.event_config, sender, diagnostic_id))
            }
            None => None,
        };

        let (data_source, initialized) = start_data_source(
            self.data_source,
            self.host_policy,
            Arc::clone(&self.store),
            self.start_wait,
        )?;

        Ok(Client::assemble(self.sdk_key, self.store, data_source, self.big_segments, events, initialized, false))
    }
}

/// Starts the configured data source (if any) and waits up to
/// `start_wait` for its first sync, returning whether it completed in
/// time.
fn start_data_source<S>(
    choice: DataSourceChoice,
    host_policy: HttpHostPolicy,
    store: Arc<S>,
    start_wait: Duration,
) -> Result<(Option<Box<dyn DataSourceHandle>>, bool), ClientError>
where
    S: DataStore + 'static,
{
    match choice {
        DataSourceChoice::None => {
            let initialized = store.initialized().map_err(|err| ClientError::Store(err.to_string()))?;
            Ok((None, initialized))
        }
        DataSourceChoice::Streaming(config) => {
            let (ready_tx, ready_rx) = mpsc::sync_channel(1);
            let source = StreamingDataSource::start(config, host_policy, store, |_changes| {}, ready_tx)?;
            let initialized = ready_rx.recv_timeout(start_wait).map(|signal| signal.initialized).unwrap_or(false);
            Ok((Some(Box::new(source)), initialized))
        }
        DataSourceChoice::Polling(config) => {
            let (ready_tx, ready_rx) = mpsc::sync_channel(1);
            let source = PollingDataSource::start(config, host_policy, store, |_changes| {}, ready_tx)?;
            let initialized = ready_rx.recv_timeout(start_wait).map(|signal| signal.initialized).unwrap_or(false);
            Ok((Some(Box::new(source)), initialized))
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

    use std::thread;

    use flagline_core::Context;
    use flagline_store::MemoryDataStore;

    use super::*;

    #[test]
    fn offline_build_never_touches_the_store() {
        let store = Arc::new(MemoryDataStore::new());
        let client = ClientBuilder::new("sdk-key", store).offline().build().expect("offline build succeeds");
        assert!(client.is_initialized());
        client.close();
    }

    #[test]
    fn build_with_no_data_source_reports_the_store_initialized_state() {
        let store = Arc::new(MemoryDataStore::new());
        let client = ClientBuilder::new("sdk-key", Arc::clone(&store)).build().expect("builds without a data source");
        assert!(!client.is_initialized());

        store.init(Vec::new(), Vec::new()).expect("infallible store");
        let client = ClientBuilder::new("sdk-key", store).build().expect("builds without a data source");
        assert!(client.is_initialized());
    }

    #[test]
    fn identify_reaches_a_configured_event_endpoint() {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("bind local server");
        let port = server.server_addr().to_ip().expect("ip addr").port();
        let handle = thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let response = tiny_http::Response::from_string("ok").with_status_code(202);
                let _ = request.respond(response);
            }
        });

        let store = Arc::new(MemoryDataStore::new());
        store.init(Vec::new(), Vec::new()).expect("infallible store");
        let events_uri = Url::parse(&format!("http://127.0.0.1:{port}/bulk")).expect("valid url");
        let client = ClientBuilder::new("sdk-key", store).events(events_uri).build().expect("builds with events");

        let ctx = Context::single("user", "u1", std::collections::BTreeMap::new()).expect("valid context");
        client.identify(&ctx);
        client.flush();
        client.close();

        handle.join().expect("server thread joins");
    }
}
