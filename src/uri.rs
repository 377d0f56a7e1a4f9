//! URI assembly rules: base joining and query appending.
//!
//! The executor builds one absolute URL per send. An absolute request URI is
//! used verbatim; a relative one is joined onto the configured base with a
//! single `/` separator. Query parameters are appended with `?` or `&` as
//! appropriate, preserving any fragment.

use crate::error::Error;
use url::Url;

/// Returns true when `uri` already carries a scheme (`http://`, `https://`).
#[must_use]
pub fn is_absolute(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

/// Join a relative request URI onto an absolute base.
///
/// Exactly one `/` separates the two parts: a trailing `/` on the base is
/// dropped, and a leading `/` on the relative part becomes the separator.
///
/// # Errors
///
/// Returns `InvalidOption` when `base` is empty or not absolute while the
/// request URI is relative.
pub fn join_base(base: Option<&str>, uri: &str) -> Result<String, Error> {
    if is_absolute(uri) {
        return Ok(uri.to_string());
    }

    let base = match base {
        Some(b) if !b.trim().is_empty() => b.trim(),
        _ => {
            return Err(Error::invalid_option(
                "base_uri",
                format!("relative request URI '{uri}' requires an absolute base_uri"),
            ))
        }
    };

    if !is_absolute(base) {
        return Err(Error::invalid_option(
            "base_uri",
            format!("'{base}' is not an absolute URI"),
        ));
    }

    let trimmed_base = base.trim_end_matches('/');
    if uri.is_empty() {
        return Ok(trimmed_base.to_string());
    }

    if uri.starts_with('/') {
        Ok(format!("{trimmed_base}{uri}"))
    } else {
        Ok(format!("{trimmed_base}/{uri}"))
    }
}

/// Append query parameters to a URL string, honoring any existing query
/// string and preserving the fragment.
///
/// Keys and values are percent-encoded. Pairs are appended in the order
/// given.
#[must_use]
pub fn append_query(url: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }

    // Split off the fragment first so the appended query never swallows it
    let (without_fragment, fragment) = match url.split_once('#') {
        Some((head, frag)) => (head, Some(frag)),
        None => (url, None),
    };

    let mut encoded = String::new();
    for (i, (key, value)) in params.iter().enumerate() {
        if i > 0 {
            encoded.push('&');
        }
        encoded.push_str(&urlencoding::encode(key));
        encoded.push('=');
        encoded.push_str(&urlencoding::encode(value));
    }

    let separator = if without_fragment.contains('?') {
        '&'
    } else {
        '?'
    };

    match fragment {
        Some(frag) => format!("{without_fragment}{separator}{encoded}#{frag}"),
        None => format!("{without_fragment}{separator}{encoded}"),
    }
}

/// Parse and validate a fully assembled URL.
///
/// # Errors
///
/// Returns `InvalidOption` when the URL cannot be parsed or is missing a
/// host.
pub fn parse_absolute(url: &str) -> Result<Url, Error> {
    let parsed = Url::parse(url)
        .map_err(|e| Error::invalid_option("uri", format!("'{url}' failed to parse: {e}")))?;
    if parsed.host_str().is_none() {
        return Err(Error::invalid_option("uri", format!("'{url}' has no host")));
    }
    Ok(parsed)
}

/// The `(scheme, host, port)` tuple used to shard pooled connections.
///
/// Host is lowercased; the port falls back to the scheme default.
#[must_use]
pub fn host_key(url: &Url) -> String {
    let scheme = url.scheme();
    let host = url.host_str().unwrap_or_default().to_lowercase();
    let port = url.port_or_known_default().unwrap_or(0);
    format!("{scheme}://{host}:{port}")
}
