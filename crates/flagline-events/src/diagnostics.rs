// crates/flagline-events/src/diagnostics.rs
// ============================================================================
// Module: Diagnostic Side Channel
// Description: Periodic, low-rate statistics about the running SDK instance,
//              shipped independently of the regular event flush cadence.
// Purpose: Give the control plane aggregate health signals (reconnect
//          counts, dropped events) without inflating the main event stream.
// Dependencies: serde_json
// ============================================================================

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;

/// The lowest permitted diagnostic recording interval.
pub const MIN_DIAGNOSTIC_INTERVAL: Duration = Duration::from_secs(60);
/// The default diagnostic recording interval.
pub const DEFAULT_DIAGNOSTIC_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Identifies the running SDK instance for the `init` diagnostic event.
#[derive(Debug, Clone)]
pub struct DiagnosticId {
    /// The SDK key, abbreviated to its last six characters.
    pub sdk_key_suffix: String,
    /// This crate's version string.
    pub sdk_version: &'static str,
    /// The host platform, as reported by `std::env::consts::OS`.
    pub platform: &'static str,
}

impl DiagnosticId {
    /// Builds a diagnostic identity from a live SDK key.
    #[must_use]
    pub fn new(sdk_key: &str) -> Self {
        let suffix_len = sdk_key.len().min(6);
        let sdk_key_suffix = sdk_key[sdk_key.len() - suffix_len..].to_owned();
        Self { sdk_key_suffix, sdk_version: env!("CARGO_PKG_VERSION"), platform: std::env::consts::OS }
    }
}

/// Running counters accumulated between diagnostic flushes.
#[derive(Default)]
pub struct DiagnosticCounters {
    dropped_events: AtomicU64,
    events_in_queue: AtomicU64,
    stream_init_failures: AtomicU64,
    stream_reconnects: AtomicU64,
}

impl DiagnosticCounters {
    /// Creates a zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that an event was dropped because the bounded queue was full.
    pub fn record_dropped_event(&self) {
        self.dropped_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a streaming connection attempt that failed before becoming
    /// valid.
    pub fn record_stream_init_failure(&self) {
        self.stream_init_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a streaming reconnection (a connection that had gone valid,
    /// then dropped and was retried).
    pub fn record_stream_reconnect(&self) {
        self.stream_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Sets the current depth of the event queue, sampled at flush time.
    pub fn set_events_in_queue(&self, depth: u64) {
        self.events_in_queue.store(depth, Ordering::Relaxed);
    }

    /// Renders a periodic diagnostic document and resets the counters that
    /// are defined as "since last periodic event" rather than cumulative.
    #[must_use]
    pub fn flush_periodic(&self, id: &DiagnosticId, now_ms: i64, interval_ms: i64) -> Value {
        let dropped = self.dropped_events.swap(0, Ordering::Relaxed);
        let init_failures = self.stream_init_failures.swap(0, Ordering::Relaxed);
        let reconnects = self.stream_reconnects.swap(0, Ordering::Relaxed);
        let in_queue = self.events_in_queue.load(Ordering::Relaxed);

        json!({
            "kind": "diagnostic",
            "creationDate": now_ms,
            "id": {
                "sdkKeySuffix": id.sdk_key_suffix,
                "diagnosticId": id.sdk_key_suffix,
            },
            "sdk": {
                "name": "flagline-server-sdk",
                "version": id.sdk_version,
            },
            "platform": { "name": id.platform },
            "eventsInLastBatch": 0,
            "droppedEvents": dropped,
            "eventsInQueue": in_queue,
            "streamInits": [{ "failed": init_failures > 0, "timestamp": now_ms }],
            "reconnectCount": reconnects,
            "periodMs": interval_ms,
        })
    }

    /// Renders the one-time `diagnostic-init` document sent at startup.
    #[must_use]
    pub fn init_document(id: &DiagnosticId, now_ms: i64) -> Value {
        json!({
            "kind": "diagnostic-init",
            "creationDate": now_ms,
            "id": {
                "sdkKeySuffix": id.sdk_key_suffix,
                "diagnosticId": id.sdk_key_suffix,
            },
            "sdk": {
                "name": "flagline-server-sdk",
                "version": id.sdk_version,
            },
            "platform": { "name": id.platform },
        })
    }
}

/// Clamps a configured diagnostic interval to the minimum floor.
#[must_use]
pub fn clamp_interval(requested: Duration) -> Duration {
    requested.max(MIN_DIAGNOSTIC_INTERVAL)
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
    fn interval_below_floor_is_clamped() {
        assert_eq!(clamp_interval(Duration::from_secs(5)), MIN_DIAGNOSTIC_INTERVAL);
        assert_eq!(clamp_interval(Duration::from_secs(120)), Duration::from_secs(120));
    }

    #[test]
    fn periodic_flush_resets_counters() {
        let counters = DiagnosticCounters::new();
        counters.record_dropped_event();
        counters.record_stream_reconnect();
        let id = DiagnosticId::new("sdk-12345678");

        let doc = counters.flush_periodic(&id, 1_000, 900_000);
        assert_eq!(doc["droppedEvents"], 1);
        assert_eq!(doc["reconnectCount"], 1);

        let second = counters.flush_periodic(&id, 2_000, 900_000);
        assert_eq!(second["droppedEvents"], 0);
        assert_eq!(second["reconnectCount"], 0);
    }

    #[test]
    fn diagnostic_id_keeps_only_the_key_suffix() {
        let id = DiagnosticId::new("sdk-abcdef123456");
        assert_eq!(id.sdk_key_suffix, "123456");
    }
}
