//! RFC 7234 `Cache-Control` directive parsing.
//!
//! The parser is deliberately forgiving: unknown directives are skipped,
//! malformed numeric arguments invalidate only that directive, and names
//! are matched case-insensitively. Values may be quoted.

/// The parsed directives the cache policy consults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub no_store: bool,
    pub no_cache: bool,
    pub private: bool,
    pub public: bool,
    pub must_revalidate: bool,
    pub max_age: Option<u64>,
    pub s_maxage: Option<u64>,
    pub stale_while_revalidate: Option<u64>,
    pub stale_if_error: Option<u64>,
}

impl CacheControl {
    /// Parse a `Cache-Control` header value.
    ///
    /// Multiple header occurrences should be joined with `,` before
    /// parsing, which is how HTTP permits them to be combined.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let mut control = Self::default();

        for directive in split_directives(value) {
            let (name, arg) = match directive.split_once('=') {
                Some((name, arg)) => (name.trim(), Some(unquote(arg.trim()))),
                None => (directive.trim(), None),
            };

            match name.to_ascii_lowercase().as_str() {
                "no-store" => control.no_store = true,
                "no-cache" => control.no_cache = true,
                "private" => control.private = true,
                "public" => control.public = true,
                "must-revalidate" => control.must_revalidate = true,
                "max-age" => control.max_age = arg.as_deref().and_then(parse_seconds),
                "s-maxage" => control.s_maxage = arg.as_deref().and_then(parse_seconds),
                "stale-while-revalidate" => {
                    control.stale_while_revalidate = arg.as_deref().and_then(parse_seconds);
                }
                "stale-if-error" => {
                    control.stale_if_error = arg.as_deref().and_then(parse_seconds);
                }
                _ => {}
            }
        }

        control
    }

    /// The freshness lifetime this header grants, honoring `s-maxage` only
    /// for shared caches.
    #[must_use]
    pub const fn freshness_lifetime(&self, shared: bool) -> Option<u64> {
        if shared {
            if let Some(s) = self.s_maxage {
                return Some(s);
            }
        }
        self.max_age
    }

    /// Whether a response carrying this header may be stored at all.
    ///
    /// `no-cache` forbids serving without revalidation rather than storing,
    /// so only `no-store` (and `private` for shared caches) block storage
    /// outright.
    #[must_use]
    pub const fn allows_store(&self, shared: bool) -> bool {
        if self.no_store {
            return false;
        }
        if shared && self.private {
            return false;
        }
        true
    }
}

/// Split a header value on commas that sit outside quoted strings.
fn split_directives(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                if start < i {
                    parts.push(&value[start..i]);
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < value.len() {
        parts.push(&value[start..]);
    }

    parts
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn unquote(s: &str) -> String {
    s.trim_matches('"').to_string()
}

fn parse_seconds(s: &str) -> Option<u64> {
    s.parse::<u64>().ok()
}
