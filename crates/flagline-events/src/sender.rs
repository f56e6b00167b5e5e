// crates/flagline-events/src/sender.rs
// ============================================================================
// Module: Event Delivery
// Description: Ships a flush payload to the control plane's events endpoint
//              with an idempotency header, one retry, and permanent-failure
//              disabling.
// Purpose: Isolate HTTP delivery mechanics from the flushing/summarizing
//          logic in `pipeline`.
// Dependencies: reqwest (blocking), serde_json, url, uuid
// ============================================================================

//! ## Overview
//! A fresh idempotency header value is generated per payload and preserved
//! across the one permitted retry, so the control plane can deduplicate a
//! payload it actually received but whose response was lost.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderMap;
use url::Url;
use uuid::Uuid;

use crate::error::DeliveryError;
use crate::model::OutputEvent;

const EVENT_SCHEMA_HEADER: &str = "X-Flagline-Event-Schema";
const PAYLOAD_ID_HEADER: &str = "X-Flagline-Payload-ID";
const EVENT_SCHEMA_VERSION: &str = "4";

/// Delivers flush payloads to a single events endpoint, tracking whether a
/// permanent failure has disabled further delivery.
pub struct EventSender {
    client: Client,
    events_uri: Url,
    diagnostic_uri: Url,
    sdk_key: String,
    disabled: AtomicBool,
}

impl EventSender {
    /// Builds a sender posting to `{events_uri}/bulk` and
    /// `{events_uri}/diagnostic`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Transport`] if the HTTP client cannot be
    /// built.
    pub fn new(events_uri: Url, sdk_key: impl Into<String>) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;
        let diagnostic_uri = events_uri
            .join("diagnostic")
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;
        Ok(Self { client, events_uri, diagnostic_uri, sdk_key: sdk_key.into(), disabled: AtomicBool::new(false) })
    }

    /// Returns whether a permanent failure has already disabled delivery.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    /// Delivers a flush payload, retrying once on a transient failure and
    /// permanently disabling the sender on a `401/403/404/410` response.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] if both attempts fail, or immediately if
    /// the sender is already disabled.
    pub fn send(&self, events: &[OutputEvent]) -> Result<(), DeliveryError> {
        if self.is_disabled() {
            return Err(DeliveryError::HttpStatus { status: 410 });
        }
        let body = serde_json::to_vec(events).map_err(|err| DeliveryError::Serialize(err.to_string()))?;
        let idempotency_key = Uuid::new_v4().to_string();

        match self.post_bulk(&body, &idempotency_key) {
            Ok(()) => Ok(()),
            Err(err) if err.is_permanent() => {
                self.disabled.store(true, Ordering::SeqCst);
                Err(err)
            }
            Err(DeliveryError::HttpStatus { status: 429 }) => {
                // The control plane sets its own pace via Retry-After; the
                // header was already honored by `post_bulk`'s sleep before
                // surfacing this error, so the retry below reuses the same
                // idempotency key rather than treating this as a fresh send.
                self.post_bulk(&body, &idempotency_key).map_err(|err| {
                    if err.is_permanent() {
                        self.disabled.store(true, Ordering::SeqCst);
                    }
                    err
                })
            }
            Err(_) => self.post_bulk(&body, &idempotency_key).map_err(|err| {
                if err.is_permanent() {
                    self.disabled.store(true, Ordering::SeqCst);
                }
                err
            }),
        }
    }

    fn post_bulk(&self, body: &[u8], idempotency_key: &str) -> Result<(), DeliveryError> {
        let bulk_uri = self
            .events_uri
            .join("bulk")
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;
        let response = self
            .client
            .post(bulk_uri)
            .header("Authorization", self.sdk_key.as_str())
            .header(CONTENT_TYPE, "application/json")
            .header(EVENT_SCHEMA_HEADER, EVENT_SCHEMA_VERSION)
            .header(PAYLOAD_ID_HEADER, idempotency_key)
            .body(body.to_vec())
            .send()
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;
        let status = response.status();
        if status.as_u16() == 429 {
            if let Some(delay) = retry_after_delay(response.headers()) {
                thread::sleep(delay);
            }
        }
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::HttpStatus { status: status.as_u16() })
        }
    }

    /// Posts a diagnostic document to `{events_uri}/diagnostic`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] on transport or status failure. Diagnostic
    /// failures never disable the sender (they don't affect real event
    /// delivery).
    pub fn send_diagnostic(&self, document: &serde_json::Value) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.diagnostic_uri.clone())
            .header("Authorization", self.sdk_key.as_str())
            .header(CONTENT_TYPE, "application/json")
            .json(document)
            .send()
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::HttpStatus { status: status.as_u16() })
        }
    }
}

/// Parses a `Retry-After` header as either a delta-seconds integer or an
/// HTTP-date, returning the remaining delay. Unparseable or past-due values
/// are treated as no delay.
fn retry_after_delay(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    if let Ok(seconds) = raw.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let target = time::OffsetDateTime::parse(raw, &time::format_description::well_known::Rfc2822).ok()?;
    let now = time::OffsetDateTime::now_utc();
    let delta = target - now;
    u64::try_from(delta.whole_seconds()).ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "test assertions favor panics over error propagation"
    )]

    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    use super::*;

    #[test]
    fn permanent_failure_disables_the_sender() {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("bind local server");
        let port = server.server_addr().to_ip().expect("ip addr").port();
        let handle = thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let response = tiny_http::Response::from_string("forbidden").with_status_code(403);
                let _ = request.respond(response);
            }
        });

        let url = Url::parse(&format!("http://127.0.0.1:{port}/")).expect("valid url");
        let sender = EventSender::new(url, "key").expect("buildable");
        let err = sender.send(&[]).expect_err("should fail");
        assert!(err.is_permanent());
        assert!(sender.is_disabled());

        handle.join().expect("server thread joins");
    }

    #[test]
    fn transient_failure_retries_once() {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("bind local server");
        let port = server.server_addr().to_ip().expect("ip addr").port();
        let attempts = Arc::new(AtomicUsize::new(0));
        let thread_attempts = Arc::clone(&attempts);
        let handle = thread::spawn(move || {
            for _ in 0..2 {
                if let Ok(request) = server.recv() {
                    thread_attempts.fetch_add(1, Ordering::SeqCst);
                    let response = tiny_http::Response::from_string("ok").with_status_code(200);
                    let _ = request.respond(response);
                }
            }
        });

        let url = Url::parse(&format!("http://127.0.0.1:{port}/")).expect("valid url");
        let sender = EventSender::new(url, "key").expect("buildable");
        sender.send(&[]).expect("first attempt succeeds");
        assert!(!sender.is_disabled());

        handle.join().expect("server thread joins");
        assert!(attempts.load(Ordering::SeqCst) >= 1);
    }
}
