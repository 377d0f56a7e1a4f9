//! Request option normalization and merging.
//!
//! A request is described by a free-form mapping (accepted via
//! [`RequestOptions::from_json`]) or built directly as a typed
//! [`RequestOptions`]. Normalization rewrites alias keys to canonical ones,
//! validates types and ranges, enforces body-source precedence
//! (`json > form > multipart > body`) and fills in body-implied headers.
//!
//! Merging is a pure function: `merge(defaults, overrides)` returns a new
//! option set where every key present in `overrides` wins. Applying the same
//! merge twice yields the same result.

use crate::constants;
use crate::error::Error;
use crate::retry::ErrorClass;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, warn};

/// The single body representation the transport sees.
///
/// Chosen once at normalization time; the mutually-exclusive `json` / `form`
/// / `multipart` / `body` option keys collapse into this variant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Body {
    /// No request body
    #[default]
    None,
    /// JSON value, serialized with `Content-Type: application/json`
    Json(Value),
    /// URL-encoded pairs with `Content-Type: application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
    /// Multipart parts with a generated boundary
    Multipart(Vec<Part>),
    /// Raw bytes with an optional explicit content type
    Raw(Vec<u8>, Option<String>),
}

impl Body {
    /// The content type implied by this body source, if any.
    #[must_use]
    pub fn implied_content_type(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Json(_) => Some(constants::CONTENT_TYPE_JSON),
            Self::Form(_) => Some(constants::CONTENT_TYPE_FORM),
            Self::Multipart(_) => Some(constants::CONTENT_TYPE_MULTIPART),
            Self::Raw(_, ct) => ct.as_deref(),
        }
    }

    /// Whether a body is present at all.
    #[must_use]
    pub const fn is_some(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// The body bytes as they participate in cache-key hashing.
    ///
    /// JSON is serialized compactly, form pairs are URL-encoded, multipart
    /// hashes each part's name and payload in order.
    #[must_use]
    pub fn hashable_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Self::None => None,
            Self::Json(v) => Some(serde_json::to_vec(v).unwrap_or_default()),
            Self::Form(pairs) => {
                let mut out = Vec::new();
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        out.push(b'&');
                    }
                    out.extend_from_slice(urlencoding::encode(k).as_bytes());
                    out.push(b'=');
                    out.extend_from_slice(urlencoding::encode(v).as_bytes());
                }
                Some(out)
            }
            Self::Multipart(parts) => {
                let mut out = Vec::new();
                for part in parts {
                    out.extend_from_slice(part.name.as_bytes());
                    out.push(0);
                    match &part.kind {
                        PartKind::Text(t) => out.extend_from_slice(t.as_bytes()),
                        PartKind::Bytes { data, .. } => out.extend_from_slice(data),
                    }
                    out.push(0);
                }
                Some(out)
            }
            Self::Raw(bytes, _) => Some(bytes.clone()),
        }
    }
}

/// One part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub kind: PartKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartKind {
    Text(String),
    Bytes {
        data: Vec<u8>,
        file_name: Option<String>,
        content_type: Option<String>,
    },
}

impl Part {
    /// A plain text field part.
    #[must_use]
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PartKind::Text(value.into()),
        }
    }

    /// A binary part with optional file name and content type.
    #[must_use]
    pub fn bytes(
        name: impl Into<String>,
        data: Vec<u8>,
        file_name: Option<String>,
        content_type: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: PartKind::Bytes {
                data,
                file_name,
                content_type,
            },
        }
    }
}

/// Per-request cache sub-options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheRequestOptions {
    /// Whether the cache participates in this request at all
    pub enabled: Option<bool>,
    /// Explicit TTL overriding all header-derived freshness
    pub ttl: Option<Duration>,
    /// Skip lookup but store the fresh response
    pub force_refresh: Option<bool>,
    /// Explicit key replacing the derived digest (prefix still applied)
    pub key: Option<String>,
    /// Include the body hash in the key for unsafe methods.
    ///
    /// Two requests differing only in a header not listed under
    /// `vary_headers` will share a key; callers opting in own that risk.
    pub cache_body: Option<bool>,
    /// Honor response `Cache-Control` on store decisions
    pub respect_headers: Option<bool>,
    /// Treat the cache as shared (enables `s-maxage`, excludes `private`)
    pub is_shared: Option<bool>,
}

impl CacheRequestOptions {
    fn merge(base: &Self, over: &Self) -> Self {
        Self {
            enabled: over.enabled.or(base.enabled),
            ttl: over.ttl.or(base.ttl),
            force_refresh: over.force_refresh.or(base.force_refresh),
            key: over.key.clone().or_else(|| base.key.clone()),
            cache_body: over.cache_body.or(base.cache_body),
            respect_headers: over.respect_headers.or(base.respect_headers),
            is_shared: over.is_shared.or(base.is_shared),
        }
    }
}

/// The normalized, recognized option set.
///
/// All fields are optional; unset fields fall through to the next layer in
/// the merge chain (library defaults → client defaults → per-call options →
/// method override).
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Option<String>,
    pub base_uri: Option<String>,
    pub headers: IndexMap<String, String>,
    pub query: IndexMap<String, String>,
    pub json: Option<Value>,
    pub form: Option<Vec<(String, String)>>,
    pub multipart: Option<Vec<Part>>,
    pub body: Option<(Vec<u8>, Option<String>)>,
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub retry_status_codes: Option<BTreeSet<u16>>,
    pub retry_exceptions: Option<Vec<ErrorClass>>,
    pub auth: Option<(String, String)>,
    pub token: Option<String>,
    pub proxy: Option<String>,
    pub cookies: Option<bool>,
    pub allow_redirects: Option<bool>,
    pub cert: Option<String>,
    pub ssl_key: Option<String>,
    pub stream: Option<bool>,
    pub cache: CacheRequestOptions,
    pub is_async: Option<bool>,
    pub debug: Option<bool>,
    pub profile: Option<bool>,
}

impl RequestOptions {
    /// Merge `overrides` over `self`, producing a new option set.
    ///
    /// Scalar keys present in `overrides` win. Header and query maps merge
    /// key-wise (case-insensitively for headers), with the override entry
    /// replacing the base entry.
    #[must_use]
    pub fn merge(&self, overrides: &Self) -> Self {
        let mut headers = self.headers.clone();
        for (k, v) in &overrides.headers {
            set_header(&mut headers, k, v);
        }

        let mut query = self.query.clone();
        for (k, v) in &overrides.query {
            query.insert(k.clone(), v.clone());
        }

        Self {
            method: overrides.method.clone().or_else(|| self.method.clone()),
            base_uri: overrides.base_uri.clone().or_else(|| self.base_uri.clone()),
            headers,
            query,
            json: overrides.json.clone().or_else(|| self.json.clone()),
            form: overrides.form.clone().or_else(|| self.form.clone()),
            multipart: overrides
                .multipart
                .clone()
                .or_else(|| self.multipart.clone()),
            body: overrides.body.clone().or_else(|| self.body.clone()),
            timeout: overrides.timeout.or(self.timeout),
            connect_timeout: overrides.connect_timeout.or(self.connect_timeout),
            retries: overrides.retries.or(self.retries),
            retry_delay: overrides.retry_delay.or(self.retry_delay),
            retry_status_codes: overrides
                .retry_status_codes
                .clone()
                .or_else(|| self.retry_status_codes.clone()),
            retry_exceptions: overrides
                .retry_exceptions
                .clone()
                .or_else(|| self.retry_exceptions.clone()),
            auth: overrides.auth.clone().or_else(|| self.auth.clone()),
            token: overrides.token.clone().or_else(|| self.token.clone()),
            proxy: overrides.proxy.clone().or_else(|| self.proxy.clone()),
            cookies: overrides.cookies.or(self.cookies),
            allow_redirects: overrides.allow_redirects.or(self.allow_redirects),
            cert: overrides.cert.clone().or_else(|| self.cert.clone()),
            ssl_key: overrides.ssl_key.clone().or_else(|| self.ssl_key.clone()),
            stream: overrides.stream.or(self.stream),
            cache: CacheRequestOptions::merge(&self.cache, &overrides.cache),
            is_async: overrides.is_async.or(self.is_async),
            debug: overrides.debug.or(self.debug),
            profile: overrides.profile.or(self.profile),
        }
    }

    /// Parse a free-form JSON mapping into a recognized option set.
    ///
    /// Alias keys are canonicalized (`max_retries` → `retries`,
    /// `basic_auth` → `auth`). Unrecognized keys are logged and ignored.
    /// Duration-valued keys accept either numbers or strings like `"500ms"`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOption` on any type or range violation.
    #[allow(clippy::too_many_lines)]
    pub fn from_json(value: &Value) -> Result<Self, Error> {
        let map = value
            .as_object()
            .ok_or_else(|| Error::invalid_option("options", "expected a JSON object"))?;

        let mut opts = Self::default();

        for (key, val) in map {
            match canonical_key(key) {
                "method" => {
                    opts.method = Some(expect_string(key, val)?);
                }
                "base_uri" => {
                    opts.base_uri = Some(expect_string(key, val)?);
                }
                "headers" => {
                    for (k, v) in expect_string_map(key, val)? {
                        set_header(&mut opts.headers, &k, &v);
                    }
                }
                "query" => {
                    for (k, v) in expect_scalar_map(key, val)? {
                        opts.query.insert(k, v);
                    }
                }
                "json" => {
                    opts.json = Some(val.clone());
                }
                "form" => {
                    opts.form = Some(expect_scalar_map(key, val)?);
                }
                "multipart" => {
                    opts.multipart = Some(parse_multipart(val)?);
                }
                "body" => {
                    opts.body = Some(parse_raw_body(val)?);
                }
                "timeout" => {
                    opts.timeout = Some(parse_duration_value(key, val, DurationUnit::Seconds)?);
                }
                "connect_timeout" => {
                    opts.connect_timeout =
                        Some(parse_duration_value(key, val, DurationUnit::Seconds)?);
                }
                "retries" => {
                    opts.retries = Some(expect_count(key, val)?);
                }
                "retry_delay" => {
                    opts.retry_delay =
                        Some(parse_duration_value(key, val, DurationUnit::Millis)?);
                }
                "retry_status_codes" => {
                    opts.retry_status_codes = Some(expect_status_set(key, val)?);
                }
                "retry_exceptions" => {
                    opts.retry_exceptions = Some(expect_error_classes(key, val)?);
                }
                "auth" => {
                    opts.auth = Some(expect_pair(key, val)?);
                }
                "token" => {
                    opts.token = Some(expect_string(key, val)?);
                }
                "proxy" => {
                    opts.proxy = Some(expect_string(key, val)?);
                }
                "cookies" => {
                    opts.cookies = Some(expect_bool(key, val)?);
                }
                "allow_redirects" => {
                    opts.allow_redirects = Some(expect_bool(key, val)?);
                }
                "cert" => {
                    opts.cert = Some(expect_string(key, val)?);
                }
                "ssl_key" => {
                    opts.ssl_key = Some(expect_string(key, val)?);
                }
                "stream" => {
                    opts.stream = Some(expect_bool(key, val)?);
                }
                "cache" => {
                    opts.cache = parse_cache_options(val)?;
                }
                "async" => {
                    opts.is_async = Some(expect_bool(key, val)?);
                }
                "debug" => {
                    opts.debug = Some(expect_bool(key, val)?);
                }
                "profiler" => {
                    opts.profile = Some(expect_bool(key, val)?);
                }
                other => {
                    warn!(key = other, "ignoring unrecognized request option");
                }
            }
        }

        Ok(opts)
    }

    /// Validate this option set and resolve the single body source.
    ///
    /// Performs the checks that must happen before any I/O: method is a
    /// known verb, `base_uri` is absolute when present, timeouts are
    /// positive. Enforces body-source precedence, discarding lower-priority
    /// sources, and fills in body-implied and auth headers unless the
    /// caller supplied an override.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOption` on validation failure.
    pub fn normalize(&self, method_override: Option<&str>) -> Result<Normalized, Error> {
        let method = method_override
            .map(str::to_string)
            .or_else(|| self.method.clone())
            .unwrap_or_else(|| constants::HTTP_METHOD_GET.to_string())
            .to_uppercase();

        if !constants::ALLOWED_METHODS.contains(&method.as_str()) {
            return Err(Error::invalid_option(
                "method",
                format!("'{method}' is not a recognized HTTP verb"),
            ));
        }

        if let Some(base) = &self.base_uri {
            if !crate::uri::is_absolute(base) {
                return Err(Error::invalid_option(
                    "base_uri",
                    format!("'{base}' must be absolute"),
                ));
            }
        }

        for (name, value) in [
            ("timeout", self.timeout),
            ("connect_timeout", self.connect_timeout),
        ] {
            if let Some(d) = value {
                if d.is_zero() {
                    return Err(Error::invalid_option(name, "must be positive"));
                }
            }
        }

        // Body-source precedence: json > form > multipart > raw body.
        // Only the winner survives; losers are dropped with a debug note.
        let body = if let Some(json) = &self.json {
            if self.form.is_some() || self.multipart.is_some() || self.body.is_some() {
                debug!("json body takes precedence; dropping lower-priority body sources");
            }
            Body::Json(json.clone())
        } else if let Some(form) = &self.form {
            if self.multipart.is_some() || self.body.is_some() {
                debug!("form body takes precedence; dropping lower-priority body sources");
            }
            Body::Form(form.clone())
        } else if let Some(parts) = &self.multipart {
            if self.body.is_some() {
                debug!("multipart body takes precedence; dropping raw body");
            }
            Body::Multipart(parts.clone())
        } else if let Some((bytes, ct)) = &self.body {
            Body::Raw(bytes.clone(), ct.clone())
        } else {
            Body::None
        };

        let mut headers = self.headers.clone();

        // Body-implied content type, unless the caller already set one
        if let Some(ct) = body.implied_content_type() {
            if get_header(&headers, constants::HEADER_CONTENT_TYPE).is_none() {
                headers.insert(constants::HEADER_CONTENT_TYPE.to_string(), ct.to_string());
            }
        }

        // Authorization: explicit header > bearer token > basic credentials
        if get_header(&headers, constants::HEADER_AUTHORIZATION).is_none() {
            if let Some(token) = &self.token {
                headers.insert(
                    constants::HEADER_AUTHORIZATION.to_string(),
                    format!("Bearer {token}"),
                );
            } else if let Some((user, pass)) = &self.auth {
                use base64::Engine;
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{user}:{pass}"));
                headers.insert(
                    constants::HEADER_AUTHORIZATION.to_string(),
                    format!("Basic {encoded}"),
                );
            }
        }

        let timeout = self
            .timeout
            .unwrap_or(Duration::from_secs(constants::DEFAULT_TIMEOUT_SECS));
        // connect_timeout defaults to timeout when unset
        let connect_timeout = self.connect_timeout.unwrap_or(timeout);

        Ok(Normalized {
            method,
            headers,
            query: self.query.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            body,
            timeout,
            connect_timeout,
        })
    }
}

/// The validated output of [`RequestOptions::normalize`]: the pieces that
/// required cross-key resolution.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub method: String,
    pub headers: IndexMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Body,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

/// Rewrite alias keys to their canonical names.
fn canonical_key(key: &str) -> &str {
    match key {
        "max_retries" => "retries",
        "connect-timeout" => "connect_timeout",
        "basic_auth" => "auth",
        "bearer" | "bearer_token" => "token",
        other => other,
    }
}

/// Case-insensitive header get.
#[must_use]
pub fn get_header<'a>(headers: &'a IndexMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Case-insensitive header set; last write wins and replaces in place.
pub fn set_header(headers: &mut IndexMap<String, String>, name: &str, value: &str) {
    if let Some(existing) = headers
        .keys()
        .find(|k| k.eq_ignore_ascii_case(name))
        .cloned()
    {
        headers.insert(existing, value.to_string());
    } else {
        headers.insert(name.to_string(), value.to_string());
    }
}

enum DurationUnit {
    Seconds,
    Millis,
}

fn parse_duration_value(key: &str, val: &Value, unit: DurationUnit) -> Result<Duration, Error> {
    match val {
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() || f < 0.0 {
                    return Err(Error::invalid_option(
                        key,
                        "must be a non-negative finite number",
                    ));
                }
                Ok(match unit {
                    DurationUnit::Seconds => Duration::from_secs_f64(f),
                    DurationUnit::Millis => Duration::from_millis(f.round() as u64),
                })
            } else {
                Err(Error::invalid_option(key, "not a representable number"))
            }
        }
        Value::String(s) => parse_duration_text(key, s),
        _ => Err(Error::invalid_option(
            key,
            "expected a number or duration string",
        )),
    }
}

/// Parse a human-readable duration like `"250ms"`, `"3s"` or `"2m"`.
///
/// The value is a run of digits followed by an optional unit; a bare
/// number means milliseconds. Anything else is an `InvalidOption` for
/// `key`.
fn parse_duration_text(key: &str, text: &str) -> Result<Duration, Error> {
    let text = text.trim();
    let unit_start = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(unit_start);

    if digits.is_empty() {
        return Err(Error::invalid_option(
            key,
            format!("'{text}' has no numeric value; use e.g. '500ms', '2s' or '1m'"),
        ));
    }
    let amount: u64 = digits
        .parse()
        .map_err(|_| Error::invalid_option(key, format!("'{digits}' is out of range")))?;

    match unit.trim() {
        "" | "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount * 60)),
        other => Err(Error::invalid_option(
            key,
            format!("unknown duration unit '{other}' in '{text}'"),
        )),
    }
}

fn expect_string(key: &str, val: &Value) -> Result<String, Error> {
    val.as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::invalid_option(key, "expected a string"))
}

fn expect_bool(key: &str, val: &Value) -> Result<bool, Error> {
    val.as_bool()
        .ok_or_else(|| Error::invalid_option(key, "expected a boolean"))
}

fn expect_count(key: &str, val: &Value) -> Result<u32, Error> {
    let n = val
        .as_i64()
        .ok_or_else(|| Error::invalid_option(key, "expected an integer"))?;
    u32::try_from(n).map_err(|_| Error::invalid_option(key, "must be a non-negative integer"))
}

fn expect_string_map(key: &str, val: &Value) -> Result<Vec<(String, String)>, Error> {
    let obj = val
        .as_object()
        .ok_or_else(|| Error::invalid_option(key, "expected an object"))?;
    obj.iter()
        .map(|(k, v)| {
            v.as_str()
                .map(|s| (k.clone(), s.to_string()))
                .ok_or_else(|| {
                    Error::invalid_option(key, format!("value for '{k}' must be a string"))
                })
        })
        .collect()
}

/// Like [`expect_string_map`] but numbers and booleans stringify.
fn expect_scalar_map(key: &str, val: &Value) -> Result<Vec<(String, String)>, Error> {
    let obj = val
        .as_object()
        .ok_or_else(|| Error::invalid_option(key, "expected an object"))?;
    obj.iter()
        .map(|(k, v)| match v {
            Value::String(s) => Ok((k.clone(), s.clone())),
            Value::Number(n) => Ok((k.clone(), n.to_string())),
            Value::Bool(b) => Ok((k.clone(), b.to_string())),
            _ => Err(Error::invalid_option(
                key,
                format!("value for '{k}' must be a scalar"),
            )),
        })
        .collect()
}

fn expect_status_set(key: &str, val: &Value) -> Result<BTreeSet<u16>, Error> {
    let arr = val
        .as_array()
        .ok_or_else(|| Error::invalid_option(key, "expected an array of status codes"))?;
    arr.iter()
        .map(|v| {
            v.as_u64()
                .and_then(|n| u16::try_from(n).ok())
                .filter(|n| (100..=599).contains(n))
                .ok_or_else(|| Error::invalid_option(key, "status codes must be in 100..=599"))
        })
        .collect()
}

fn expect_error_classes(key: &str, val: &Value) -> Result<Vec<ErrorClass>, Error> {
    let arr = val
        .as_array()
        .ok_or_else(|| Error::invalid_option(key, "expected an array of error class names"))?;
    arr.iter()
        .map(|v| {
            let name = v
                .as_str()
                .ok_or_else(|| Error::invalid_option(key, "class names must be strings"))?;
            ErrorClass::parse(name)
                .ok_or_else(|| Error::invalid_option(key, format!("unknown error class '{name}'")))
        })
        .collect()
}

fn expect_pair(key: &str, val: &Value) -> Result<(String, String), Error> {
    let arr = val
        .as_array()
        .filter(|a| a.len() == 2)
        .ok_or_else(|| Error::invalid_option(key, "expected a [user, pass] pair"))?;
    match (arr[0].as_str(), arr[1].as_str()) {
        (Some(user), Some(pass)) => Ok((user.to_string(), pass.to_string())),
        _ => Err(Error::invalid_option(key, "pair entries must be strings")),
    }
}

fn parse_raw_body(val: &Value) -> Result<(Vec<u8>, Option<String>), Error> {
    match val {
        Value::String(s) => Ok((s.clone().into_bytes(), None)),
        Value::Object(obj) => {
            let content = obj
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::invalid_option("body", "object form requires 'content'"))?;
            let content_type = obj
                .get("content_type")
                .and_then(Value::as_str)
                .map(str::to_string);
            Ok((content.as_bytes().to_vec(), content_type))
        }
        _ => Err(Error::invalid_option(
            "body",
            "expected a string or {content, content_type} object",
        )),
    }
}

fn parse_multipart(val: &Value) -> Result<Vec<Part>, Error> {
    use base64::Engine;

    let arr = val
        .as_array()
        .ok_or_else(|| Error::invalid_option("multipart", "expected an array of parts"))?;

    arr.iter()
        .map(|part| {
            let obj = part
                .as_object()
                .ok_or_else(|| Error::invalid_option("multipart", "each part must be an object"))?;
            let name = obj
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::invalid_option("multipart", "each part requires 'name'"))?;

            if let Some(value) = obj.get("value").and_then(Value::as_str) {
                return Ok(Part::text(name, value));
            }

            let data = obj
                .get("data")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Error::invalid_option("multipart", "each part requires 'value' or 'data'")
                })
                .and_then(|b64| {
                    base64::engine::general_purpose::STANDARD
                        .decode(b64)
                        .map_err(|e| {
                            Error::invalid_option("multipart", format!("invalid base64 data: {e}"))
                        })
                })?;
            Ok(Part::bytes(
                name,
                data,
                obj.get("file_name").and_then(Value::as_str).map(str::to_string),
                obj.get("content_type")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            ))
        })
        .collect()
}

fn parse_cache_options(val: &Value) -> Result<CacheRequestOptions, Error> {
    let obj = val
        .as_object()
        .ok_or_else(|| Error::invalid_option("cache", "expected an object"))?;

    let mut cache = CacheRequestOptions::default();
    for (key, v) in obj {
        match key.as_str() {
            "enabled" => cache.enabled = Some(expect_bool("cache.enabled", v)?),
            "ttl" => {
                cache.ttl = Some(parse_duration_value("cache.ttl", v, DurationUnit::Seconds)?);
            }
            "force_refresh" => {
                cache.force_refresh = Some(expect_bool("cache.force_refresh", v)?);
            }
            "key" => cache.key = Some(expect_string("cache.key", v)?),
            "cache_body" => cache.cache_body = Some(expect_bool("cache.cache_body", v)?),
            "respect_headers" => {
                cache.respect_headers = Some(expect_bool("cache.respect_headers", v)?);
            }
            "is_shared_cache" => cache.is_shared = Some(expect_bool("cache.is_shared_cache", v)?),
            other => warn!(key = other, "ignoring unrecognized cache option"),
        }
    }
    Ok(cache)
}
