//! Exchange recording for later replay and test assertions.
//!
//! The recorder observes exchanges (real or mocked) as `(request,
//! response, captured_at)` triples. Recordings serialize to a portable
//! JSON form, import back losslessly, and can be replayed into a
//! [`MockRegistry`](super::MockRegistry) as per-URL sequences preserving
//! capture order.

use super::{MockRegistry, MockResponse, Pattern};
use crate::context::PreparedRequest;
use crate::error::Error;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// The request half of a recording.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub headers: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// The response half of a recording.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordedResponse {
    pub status: u16,
    pub headers: IndexMap<String, String>,
    pub body: String,
}

/// One observed exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recording {
    pub request: RecordedRequest,
    pub response: RecordedResponse,
    pub captured_at: DateTime<Utc>,
}

/// Records exchanges while active.
#[derive(Debug, Default)]
pub struct Recorder {
    entries: Mutex<Vec<Recording>>,
    active: AtomicBool,
}

impl Recorder {
    /// A new, inactive recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin observing exchanges.
    pub fn start(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    /// Stop observing. Recorded entries are kept.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Whether exchanges are currently being captured.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Capture one exchange. No-op while inactive.
    pub fn record(
        &self,
        request: &PreparedRequest,
        status: u16,
        response_headers: &IndexMap<String, String>,
        response_body: &[u8],
    ) {
        if !self.is_recording() {
            return;
        }

        let recording = Recording {
            request: RecordedRequest {
                method: request.method.clone(),
                url: request.url.clone(),
                headers: request.headers.clone(),
                body: request
                    .body_bytes()
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
            },
            response: RecordedResponse {
                status,
                headers: response_headers.clone(),
                body: String::from_utf8_lossy(response_body).into_owned(),
            },
            captured_at: Utc::now(),
        };

        self.entries.lock().unwrap().push(recording);
    }

    /// All recordings captured so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn recorded(&self) -> Vec<Recording> {
        self.entries.lock().unwrap().clone()
    }

    /// Drop every recording.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Serialize recordings to the portable JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn export_json(&self) -> Result<String, Error> {
        let entries = self.recorded();
        Ok(serde_json::to_string_pretty(&entries)?)
    }

    /// Restore recordings from their JSON form, appending to any already
    /// held.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not match the recording schema.
    pub fn import_json(&self, json: &str) -> Result<usize, Error> {
        let imported: Vec<Recording> = serde_json::from_str(json)?;
        let count = imported.len();
        self.entries.lock().unwrap().extend(imported);
        Ok(count)
    }

    /// Install the recordings into a registry as `"METHOD URL"` sequences,
    /// preserving capture order per key.
    ///
    /// # Errors
    ///
    /// Returns an error if a derived pattern fails to compile.
    pub fn replay(&self, registry: &MockRegistry) -> Result<(), Error> {
        // Group by "METHOD URL" preserving first-seen order of keys
        let mut grouped: IndexMap<String, Vec<MockResponse>> = IndexMap::new();
        for recording in self.recorded() {
            let key = format!("{} {}", recording.request.method, recording.request.url);
            let mut response = MockResponse::new(recording.response.status)
                .with_body(recording.response.body.into_bytes());
            for (name, value) in recording.response.headers {
                response = response.with_header(name, value);
            }
            grouped.entry(key).or_default().push(response);
        }

        for (key, responses) in grouped {
            registry.register_sequence(&key, responses, false, None)?;
        }
        Ok(())
    }

    /// Assert that at least one (or exactly `count`) recorded requests
    /// match `pattern`.
    ///
    /// # Panics
    ///
    /// Panics with a diagnostic listing the recorded requests when the
    /// assertion fails, or when the pattern cannot compile.
    pub fn assert_sent(&self, pattern: &str, count: Option<usize>) {
        let matched = self.count_matching(pattern);
        match count {
            Some(expected) if matched != expected => panic!(
                "expected {expected} requests matching '{pattern}', found {matched}\n{}",
                self.describe_recorded()
            ),
            None if matched == 0 => panic!(
                "expected at least one request matching '{pattern}', found none\n{}",
                self.describe_recorded()
            ),
            _ => {}
        }
    }

    /// Assert that no recorded request matches `pattern`.
    ///
    /// # Panics
    ///
    /// Panics with a diagnostic when a matching request was recorded.
    pub fn assert_not_sent(&self, pattern: &str) {
        let matched = self.count_matching(pattern);
        assert!(
            matched == 0,
            "expected no requests matching '{pattern}', found {matched}\n{}",
            self.describe_recorded()
        );
    }

    /// Assert the total number of recorded requests.
    ///
    /// # Panics
    ///
    /// Panics with a diagnostic when the count differs.
    pub fn assert_sent_count(&self, expected: usize) {
        let actual = self.recorded().len();
        assert!(
            actual == expected,
            "expected {expected} recorded requests, found {actual}\n{}",
            self.describe_recorded()
        );
    }

    fn count_matching(&self, pattern: &str) -> usize {
        let compiled = match Pattern::compile(pattern) {
            Ok(p) => p,
            Err(e) => panic!("invalid assertion pattern '{pattern}': {e}"),
        };
        self.recorded()
            .iter()
            .filter(|r| compiled.matches(&r.request.method, &r.request.url))
            .count()
    }

    fn describe_recorded(&self) -> String {
        let recorded = self.recorded();
        if recorded.is_empty() {
            return "recorded requests: (none)".to_string();
        }
        let mut out = String::from("recorded requests:");
        for r in recorded {
            out.push_str(&format!("\n  {} {}", r.request.method, r.request.url));
        }
        out
    }
}
