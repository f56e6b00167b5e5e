// crates/flagline-core/src/status.rs
// ============================================================================
// Module: Status Providers
// Description: The two observable lifecycles (data source, data store) and a
//              small copy-on-write listener registry shared by both.
// Purpose: Let background subsystems publish typed state transitions instead
//          of writing to a log.
// Dependencies: std::sync
// ============================================================================

//! ## Overview
//! Flagline carries no logging backend dependency (one is out of scope for
//! this core, and the workspace denies `print_stdout`/`print_stderr`
//! anyway). Every place the design calls for "log a warning" instead
//! publishes a state transition here: a host application subscribes a
//! listener and routes it to whatever logger or metrics system it already
//! has.
//!
//! # Invariants
//! - Listener lists are copy-on-write: publishing takes a lock only long
//!   enough to clone the listener `Vec`, then calls listeners without
//!   holding it, so a slow listener never blocks a concurrent `get`/`set`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

// ============================================================================
// SECTION: Data Source Status
// ============================================================================

/// The lifecycle state of a [`DataSource`](crate) implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceState {
    /// Still performing its first successful sync.
    Initializing,
    /// Has completed at least one successful sync and is current.
    Valid,
    /// Temporarily unable to sync; will keep retrying.
    Interrupted,
    /// Permanently stopped after an unrecoverable error.
    Off,
}

/// An observable snapshot of the data source's lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceStatus {
    /// The current lifecycle state.
    pub state: DataSourceState,
    /// The most recent error, if any, that caused a state transition.
    pub error: Option<DataSourceStatusError>,
    /// Epoch-millisecond timestamp of the last state change.
    pub since_ms: i64,
}

impl DataSourceStatus {
    /// Returns the initial status: `Initializing`, no error.
    #[must_use]
    pub const fn initializing(now_ms: i64) -> Self {
        Self { state: DataSourceState::Initializing, error: None, since_ms: now_ms }
    }
}

/// A classified data source failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataSourceStatusError {
    /// An HTTP status code the remote control plane returned.
    #[error("http status {status}")]
    HttpStatus {
        /// The HTTP status code observed.
        status: u16,
    },
    /// The payload received could not be parsed.
    #[error("invalid data: {0}")]
    InvalidData(String),
    /// A network-level failure (connection reset, timeout, DNS failure).
    #[error("network error: {0}")]
    NetworkError(String),
}

// ============================================================================
// SECTION: Data Store Status
// ============================================================================

/// An observable snapshot of the data store's availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataStoreStatus {
    /// Whether the store's backing driver is currently reachable.
    pub available: bool,
    /// Set once after the store recovers from an outage, so the data source
    /// knows to re-initialize rather than trust a (possibly stale) cache.
    pub needs_refresh: bool,
}

impl DataStoreStatus {
    /// Returns the status of a healthy, just-initialized store.
    #[must_use]
    pub const fn available() -> Self {
        Self { available: true, needs_refresh: false }
    }
}

// ============================================================================
// SECTION: Listener Registry
// ============================================================================

/// A copy-on-write broadcaster of status values of type `T`.
///
/// # Invariants
/// - `publish` never holds the listener-list lock while invoking a
///   listener.
pub struct StatusBroadcaster<T> {
    current: Mutex<T>,
    listeners: Mutex<Vec<Arc<dyn Fn(&T) + Send + Sync>>>,
}

impl<T: Clone> StatusBroadcaster<T> {
    /// Creates a broadcaster seeded with an initial value.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self { current: Mutex::new(initial), listeners: Mutex::new(Vec::new()) }
    }

    /// Returns a clone of the current value.
    #[must_use]
    pub fn current(&self) -> T {
        #[allow(clippy::unwrap_used, reason = "poisoned mutex indicates a prior panic in this process; propagating would only mask it")]
        self.current.lock().unwrap().clone()
    }

    /// Registers a listener invoked (with the lock released) on every
    /// `publish`.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) {
        #[allow(clippy::unwrap_used, reason = "poisoned mutex indicates a prior panic in this process; propagating would only mask it")]
        self.listeners.lock().unwrap().push(Arc::new(listener));
    }

    /// Replaces the current value and notifies every subscriber.
    pub fn publish(&self, value: T) {
        #[allow(clippy::unwrap_used, reason = "poisoned mutex indicates a prior panic in this process; propagating would only mask it")]
        {
            *self.current.lock().unwrap() = value.clone();
        }
        #[allow(clippy::unwrap_used, reason = "poisoned mutex indicates a prior panic in this process; propagating would only mask it")]
        let listeners = self.listeners.lock().unwrap().clone();
        for listener in listeners.iter() {
            listener(&value);
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

    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    #[test]
    fn publish_notifies_subscribed_listeners() {
        let broadcaster = StatusBroadcaster::new(DataStoreStatus::available());
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        broadcaster.subscribe(move |status: &DataStoreStatus| {
            if !status.available {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            }
        });
        broadcaster.publish(DataStoreStatus { available: false, needs_refresh: false });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(!broadcaster.current().available);
    }
}
