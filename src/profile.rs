//! Per-request debug snapshots and profiling aggregation.
//!
//! A [`DebugSnapshot`] captures what one send did: redacted request and
//! response views, wall-clock phase timings, memory delta and the
//! reused-connection flag. Snapshots attach to the delivered response; the
//! [`Profiler`] aggregates them into summary statistics.
//!
//! Credentials never leave this module unredacted: sensitive headers and
//! basic-auth values are replaced by `***` before a snapshot is built.

use crate::constants;
use indexmap::IndexMap;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Caps and toggles for snapshot capture.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Replace the query string with `***` in the captured URI
    pub redact_query: bool,
    /// Truncate captured bodies to this many bytes
    pub body_cap: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            redact_query: false,
            body_cap: 2048,
        }
    }
}

/// Wall-clock phase timings for one send, in milliseconds from `start`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timings {
    /// Unix milliseconds when the send began
    pub start_ms: u64,
    /// DNS phase duration, when observed
    pub dns_ms: Option<u64>,
    /// Pool checkout plus connection establishment
    pub connect_ms: Option<u64>,
    /// TLS handshake, when separately observable
    pub tls_ms: Option<u64>,
    /// Time to completed response headers
    pub first_byte_ms: Option<u64>,
    /// Total send duration
    pub total_ms: u64,
}

/// The captured view of one request/response exchange.
#[derive(Debug, Clone)]
pub struct DebugSnapshot {
    pub method: String,
    pub uri: String,
    pub request_headers: IndexMap<String, String>,
    pub request_body: Option<String>,
    pub status: u16,
    pub response_headers: IndexMap<String, String>,
    pub response_body: Option<String>,
    pub timings: Timings,
    pub memory_delta_bytes: Option<i64>,
    pub connection_reused: bool,
}

impl DebugSnapshot {
    /// Redact and truncate raw exchange data into a snapshot.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn capture(
        config: &SnapshotConfig,
        method: &str,
        uri: &str,
        request_headers: &IndexMap<String, String>,
        request_body: Option<&[u8]>,
        status: u16,
        response_headers: &IndexMap<String, String>,
        response_body: Option<&[u8]>,
        timings: Timings,
        memory_delta_bytes: Option<i64>,
        connection_reused: bool,
    ) -> Self {
        Self {
            method: method.to_string(),
            uri: redact_uri(uri, config.redact_query),
            request_headers: redact_headers(request_headers),
            request_body: request_body.map(|b| truncate_body(b, config.body_cap)),
            status,
            response_headers: redact_headers(response_headers),
            response_body: response_body.map(|b| truncate_body(b, config.body_cap)),
            timings,
            memory_delta_bytes,
            connection_reused,
        }
    }

    /// Export the snapshot as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "method": self.method,
            "uri": self.uri,
            "request_headers": self.request_headers,
            "request_body": self.request_body,
            "status": self.status,
            "response_headers": self.response_headers,
            "response_body": self.response_body,
            "timings": {
                "start_ms": self.timings.start_ms,
                "dns_ms": self.timings.dns_ms,
                "connect_ms": self.timings.connect_ms,
                "tls_ms": self.timings.tls_ms,
                "first_byte_ms": self.timings.first_byte_ms,
                "total_ms": self.timings.total_ms,
            },
            "memory_delta_bytes": self.memory_delta_bytes,
            "connection_reused": self.connection_reused,
        })
    }
}

/// Replace sensitive header values with the redaction placeholder.
#[must_use]
pub fn redact_headers(headers: &IndexMap<String, String>) -> IndexMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            if constants::is_sensitive_header(name) {
                (name.clone(), constants::REDACTED.to_string())
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}

fn redact_uri(uri: &str, redact_query: bool) -> String {
    if !redact_query {
        return uri.to_string();
    }
    match uri.split_once('?') {
        Some((base, _)) => format!("{base}?{}", constants::REDACTED),
        None => uri.to_string(),
    }
}

fn truncate_body(body: &[u8], cap: usize) -> String {
    if body.len() <= cap {
        String::from_utf8_lossy(body).into_owned()
    } else {
        let truncated = String::from_utf8_lossy(&body[..cap]);
        format!("{truncated}… ({} bytes truncated)", body.len() - cap)
    }
}

/// Resident set size in bytes, when the platform exposes it.
#[must_use]
pub fn current_rss_bytes() -> Option<i64> {
    #[cfg(target_os = "linux")]
    {
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let rss_pages: i64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        Some(rss_pages * 4096)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Per-request profile entry.
#[derive(Debug, Clone)]
pub struct ProfileEntry {
    /// `METHOD URI#sequence`
    pub id: String,
    pub method: String,
    pub uri: String,
    pub total_ms: u64,
    pub memory_delta_bytes: i64,
}

/// Aggregated statistics over recorded entries.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProfileSummary {
    pub count: usize,
    pub min_ms: u64,
    pub avg_ms: f64,
    pub max_ms: u64,
    pub total_memory_delta_bytes: i64,
}

/// Aggregates snapshots across a handler's lifetime.
#[derive(Debug, Default)]
pub struct Profiler {
    entries: Mutex<HashMap<String, ProfileEntry>>,
    sequence: AtomicU64,
    active: AtomicBool,
}

impl Profiler {
    /// A new, inactive profiler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin aggregating snapshots.
    pub fn start(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    /// Stop aggregating. Recorded entries are kept.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Whether profiling is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Record one snapshot. No-op while inactive.
    ///
    /// Entries are keyed by method + URI + a monotonic sequence, so two
    /// sends of the same request profile separately.
    pub fn record(&self, snapshot: &DebugSnapshot) {
        if !self.is_active() {
            return;
        }
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let id = format!("{} {}#{seq}", snapshot.method, snapshot.uri);
        let entry = ProfileEntry {
            id: id.clone(),
            method: snapshot.method.clone(),
            uri: snapshot.uri.clone(),
            total_ms: snapshot.timings.total_ms,
            memory_delta_bytes: snapshot.memory_delta_bytes.unwrap_or(0),
        };
        self.entries.lock().unwrap().insert(id, entry);
    }

    /// All recorded entries, keyed by request id.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn entries(&self) -> HashMap<String, ProfileEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Summary statistics over everything recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn summary(&self) -> ProfileSummary {
        let entries = self.entries.lock().unwrap();
        if entries.is_empty() {
            return ProfileSummary::default();
        }

        let mut summary = ProfileSummary {
            count: entries.len(),
            min_ms: u64::MAX,
            ..ProfileSummary::default()
        };
        let mut total: u64 = 0;
        for entry in entries.values() {
            summary.min_ms = summary.min_ms.min(entry.total_ms);
            summary.max_ms = summary.max_ms.max(entry.total_ms);
            total += entry.total_ms;
            summary.total_memory_delta_bytes += entry.memory_delta_bytes;
        }
        summary.avg_ms = total as f64 / entries.len() as f64;
        summary
    }

    /// Drop every entry and restart the sequence.
    pub fn reset(&self) {
        self.entries.lock().unwrap().clear();
        self.sequence.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn snapshot(method: &str, uri: &str, total_ms: u64) -> DebugSnapshot {
        DebugSnapshot::capture(
            &SnapshotConfig::default(),
            method,
            uri,
            &headers(&[]),
            None,
            200,
            &headers(&[]),
            None,
            Timings {
                total_ms,
                ..Timings::default()
            },
            Some(1024),
            false,
        )
    }

    #[test]
    fn test_sensitive_headers_redacted() {
        let captured = DebugSnapshot::capture(
            &SnapshotConfig::default(),
            "GET",
            "https://api/a",
            &headers(&[
                ("Authorization", "Bearer sekrit"),
                ("X-API-Key", "k123"),
                ("Accept", "application/json"),
            ]),
            None,
            200,
            &headers(&[("Set-Cookie", "sid=abc")]),
            None,
            Timings::default(),
            None,
            false,
        );

        assert_eq!(captured.request_headers["Authorization"], "***");
        assert_eq!(captured.request_headers["X-API-Key"], "***");
        assert_eq!(captured.request_headers["Accept"], "application/json");
        assert_eq!(captured.response_headers["Set-Cookie"], "***");
    }

    #[test]
    fn test_query_redaction() {
        let config = SnapshotConfig {
            redact_query: true,
            ..SnapshotConfig::default()
        };
        let captured = DebugSnapshot::capture(
            &config,
            "GET",
            "https://api/a?token=sekrit",
            &headers(&[]),
            None,
            200,
            &headers(&[]),
            None,
            Timings::default(),
            None,
            false,
        );
        assert_eq!(captured.uri, "https://api/a?***");
    }

    #[test]
    fn test_body_truncation() {
        let config = SnapshotConfig {
            body_cap: 4,
            ..SnapshotConfig::default()
        };
        let captured = DebugSnapshot::capture(
            &config,
            "POST",
            "https://api/a",
            &headers(&[]),
            Some(b"0123456789"),
            200,
            &headers(&[]),
            Some(b"ok"),
            Timings::default(),
            None,
            false,
        );
        assert_eq!(
            captured.request_body.as_deref(),
            Some("0123… (6 bytes truncated)")
        );
        assert_eq!(captured.response_body.as_deref(), Some("ok"));
    }

    #[test]
    fn test_to_json_has_redacted_literal() {
        let captured = DebugSnapshot::capture(
            &SnapshotConfig::default(),
            "GET",
            "https://api/a",
            &headers(&[("Authorization", "Bearer x")]),
            None,
            200,
            &headers(&[]),
            None,
            Timings::default(),
            None,
            true,
        );
        let json = captured.to_json();
        assert_eq!(json["request_headers"]["Authorization"], "***");
        assert_eq!(json["connection_reused"], true);
        assert_eq!(json["status"], 200);
    }

    #[test]
    fn test_profiler_inactive_records_nothing() {
        let profiler = Profiler::new();
        profiler.record(&snapshot("GET", "https://api/a", 10));
        assert_eq!(profiler.summary().count, 0);
    }

    #[test]
    fn test_profiler_summary() {
        let profiler = Profiler::new();
        profiler.start();
        profiler.record(&snapshot("GET", "https://api/a", 10));
        profiler.record(&snapshot("GET", "https://api/a", 30));
        profiler.record(&snapshot("POST", "https://api/b", 20));

        let summary = profiler.summary();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.min_ms, 10);
        assert_eq!(summary.max_ms, 30);
        assert!((summary.avg_ms - 20.0).abs() < f64::EPSILON);
        assert_eq!(summary.total_memory_delta_bytes, 3 * 1024);
    }

    #[test]
    fn test_profiler_sequence_separates_repeat_requests() {
        let profiler = Profiler::new();
        profiler.start();
        profiler.record(&snapshot("GET", "https://api/a", 10));
        profiler.record(&snapshot("GET", "https://api/a", 20));
        assert_eq!(profiler.entries().len(), 2);
    }

    #[test]
    fn test_profiler_reset() {
        let profiler = Profiler::new();
        profiler.start();
        profiler.record(&snapshot("GET", "https://api/a", 10));
        profiler.reset();
        assert_eq!(profiler.summary(), ProfileSummary::default());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_rss_probe_reads_something() {
        assert!(current_rss_bytes().unwrap() > 0);
    }
}
