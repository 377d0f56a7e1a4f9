//! Request interception for tests: pattern-matched response substitution.
//!
//! The registry holds `(pattern, responder)` pairs consulted in insertion
//! order; the first matching pattern wins. A pattern is either a bare URL
//! template or `"METHOD URL"`, where `*` matches any run of characters
//! except `/`, `?` and `&`, and `**` matches anything. Responders are
//! canned responses, callables, or sequences with optional looping.
//!
//! The registry is process-global with a [`MockRegistry::reset`] hook for
//! test isolation. By default unmatched requests fall through to the real
//! transport; [`MockRegistry::prevent_stray`] turns them into errors.

pub mod recorder;

pub use recorder::{Recorder, Recording};

use crate::context::PreparedRequest;
use crate::error::Error;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

/// A canned response produced by the mock layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MockResponse {
    /// An empty response with the given status.
    #[must_use]
    pub const fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// A JSON response; sets `Content-Type: application/json`.
    #[must_use]
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![(
                crate::constants::HEADER_CONTENT_TYPE.to_string(),
                crate::constants::CONTENT_TYPE_JSON.to_string(),
            )],
            body: serde_json::to_vec(value).unwrap_or_default(),
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set a plain body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Anything that can answer an intercepted request.
pub trait Respond: Send + Sync {
    fn respond(&self, request: &PreparedRequest) -> MockResponse;
}

impl<F> Respond for F
where
    F: Fn(&PreparedRequest) -> MockResponse + Send + Sync,
{
    fn respond(&self, request: &PreparedRequest) -> MockResponse {
        self(request)
    }
}

/// A compiled request pattern: optional method plus a URL glob.
#[derive(Debug)]
pub struct Pattern {
    method: Option<String>,
    url_regex: Regex,
    source: String,
}

impl Pattern {
    /// Compile a pattern string.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOption` if the glob cannot compile.
    pub fn compile(pattern: &str) -> Result<Self, Error> {
        let trimmed = pattern.trim();

        // "METHOD URL" when the first token looks like a verb
        let (method, url_part) = match trimmed.split_once(' ') {
            Some((head, rest))
                if crate::constants::ALLOWED_METHODS
                    .contains(&head.to_uppercase().as_str()) =>
            {
                (Some(head.to_uppercase()), rest.trim())
            }
            _ => (None, trimmed),
        };

        let url_regex = compile_glob(url_part)
            .map_err(|e| Error::invalid_option("mock pattern", format!("'{pattern}': {e}")))?;

        Ok(Self {
            method,
            url_regex,
            source: pattern.to_string(),
        })
    }

    /// Whether this pattern matches a request.
    #[must_use]
    pub fn matches(&self, method: &str, url: &str) -> bool {
        if let Some(expected) = &self.method {
            if !expected.eq_ignore_ascii_case(method) {
                return false;
            }
        }
        self.url_regex.is_match(url)
    }

    /// The original pattern text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Translate a URL glob to an anchored regex: `**` matches any run, `*`
/// any run without `/`, `?` or `&`.
fn compile_glob(glob: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::from("^");
    let mut chars = glob.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    pattern.push_str(".*");
                } else {
                    pattern.push_str("[^/?&]*");
                }
            }
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
}

/// Playback state for a sequence responder.
#[derive(Debug)]
struct SequenceState {
    remaining: VecDeque<MockResponse>,
    /// Original sequence, replayed from the start when looping
    original: Vec<MockResponse>,
    loop_sequence: bool,
    when_empty: Option<MockResponse>,
}

enum ResponderKind {
    Static(MockResponse),
    Callable(Box<dyn Respond>),
    Sequence(Mutex<SequenceState>),
}

impl std::fmt::Debug for ResponderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(r) => f.debug_tuple("Static").field(&r.status).finish(),
            Self::Callable(_) => f.write_str("Callable"),
            Self::Sequence(_) => f.write_str("Sequence"),
        }
    }
}

struct MockEntry {
    pattern: Pattern,
    responder: ResponderKind,
}

/// The decision the executor acts on.
#[derive(Debug)]
pub enum MockDecision {
    /// A responder matched; use this response
    Respond(MockResponse),
    /// No pattern matched and `prevent_stray` is active
    Stray,
    /// No pattern matched; fall through to the real transport
    PassThrough,
}

#[derive(Default)]
struct RegistryInner {
    entries: Vec<MockEntry>,
    fallback: Option<Box<dyn Respond>>,
    prevent_stray: bool,
}

/// Process-global mock registry.
#[derive(Default)]
pub struct MockRegistry {
    inner: Mutex<RegistryInner>,
}

static GLOBAL: Lazy<MockRegistry> = Lazy::new(MockRegistry::default);

/// The process-global registry shared by all handlers.
#[must_use]
pub fn global() -> &'static MockRegistry {
    &GLOBAL
}

impl MockRegistry {
    /// Create a standalone registry (tests that need isolation from the
    /// global one).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a canned response for a pattern.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOption` if the pattern cannot compile.
    pub fn register(&self, pattern: &str, response: MockResponse) -> Result<(), Error> {
        let pattern = Pattern::compile(pattern)?;
        self.inner.lock().unwrap().entries.push(MockEntry {
            pattern,
            responder: ResponderKind::Static(response),
        });
        Ok(())
    }

    /// Register a callable responder for a pattern.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOption` if the pattern cannot compile.
    pub fn register_fn<R: Respond + 'static>(&self, pattern: &str, responder: R) -> Result<(), Error> {
        let pattern = Pattern::compile(pattern)?;
        self.inner.lock().unwrap().entries.push(MockEntry {
            pattern,
            responder: ResponderKind::Callable(Box::new(responder)),
        });
        Ok(())
    }

    /// Register a sequence of responses played back in order.
    ///
    /// When exhausted: loop from the start if `loop_sequence`, else serve
    /// `when_empty` if given, else the entry stops matching.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOption` if the pattern cannot compile.
    pub fn register_sequence(
        &self,
        pattern: &str,
        responses: Vec<MockResponse>,
        loop_sequence: bool,
        when_empty: Option<MockResponse>,
    ) -> Result<(), Error> {
        let pattern = Pattern::compile(pattern)?;
        self.inner.lock().unwrap().entries.push(MockEntry {
            pattern,
            responder: ResponderKind::Sequence(Mutex::new(SequenceState {
                remaining: responses.clone().into(),
                original: responses,
                loop_sequence,
                when_empty,
            })),
        });
        Ok(())
    }

    /// Install a fallback that answers every request no pattern handled.
    pub fn set_fallback<R: Respond + 'static>(&self, responder: R) {
        self.inner.lock().unwrap().fallback = Some(Box::new(responder));
    }

    /// Turn unmatched requests into [`MockDecision::Stray`] (and from the
    /// executor, `MockStrayRequest` errors) instead of passing through.
    pub fn prevent_stray(&self, prevent: bool) {
        self.inner.lock().unwrap().prevent_stray = prevent;
    }

    /// Whether any responder or fallback is installed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        !inner.entries.is_empty() || inner.fallback.is_some() || inner.prevent_stray
    }

    /// Resolve a request against the registered patterns.
    #[must_use]
    pub fn resolve(&self, request: &PreparedRequest) -> MockDecision {
        let inner = self.inner.lock().unwrap();

        for entry in &inner.entries {
            if !entry.pattern.matches(&request.method, &request.url) {
                continue;
            }
            match &entry.responder {
                ResponderKind::Static(response) => {
                    debug!(pattern = entry.pattern.source(), "mock matched");
                    return MockDecision::Respond(response.clone());
                }
                ResponderKind::Callable(responder) => {
                    debug!(pattern = entry.pattern.source(), "mock callable matched");
                    return MockDecision::Respond(responder.respond(request));
                }
                ResponderKind::Sequence(state) => {
                    let mut state = state.lock().unwrap();
                    if state.remaining.is_empty() && state.loop_sequence {
                        state.remaining = state.original.clone().into();
                    }
                    if let Some(response) = state.remaining.pop_front() {
                        debug!(pattern = entry.pattern.source(), "mock sequence matched");
                        return MockDecision::Respond(response);
                    }
                    if let Some(response) = &state.when_empty {
                        return MockDecision::Respond(response.clone());
                    }
                    // Exhausted without a fallback response: this entry no
                    // longer matches; later entries may still claim the
                    // request.
                }
            }
        }

        if let Some(fallback) = &inner.fallback {
            return MockDecision::Respond(fallback.respond(request));
        }

        if inner.prevent_stray {
            MockDecision::Stray
        } else {
            MockDecision::PassThrough
        }
    }

    /// Remove every pattern, fallback and flag. Test isolation hook.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.fallback = None;
        inner.prevent_stray = false;
    }
}
