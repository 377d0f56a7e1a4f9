//! The seam between the executor and the platform HTTP library.
//!
//! The pool's connections each carry a dedicated `reqwest::Client`;
//! [`ReqwestTransport`] turns a [`PreparedRequest`] into a wire exchange
//! on that handle. Redirects are followed here (bounded), so the
//! per-request `allow_redirects` directive is honored even though the
//! underlying clients are built with redirects disabled.
//!
//! When the `NO_NETWORK` environment variable is set the transport refuses
//! every send; tests rely on this to force mocked or local-only behavior.

use crate::constants;
use crate::context::PreparedRequest;
use crate::error::Error;
use crate::options::{Body, PartKind};
use crate::pool::Connection;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Maximum redirect hops followed per attempt.
const MAX_REDIRECTS: usize = 10;

/// The wire-level result of one attempt.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Vec<(String, Vec<String>)>,
    pub body: Vec<u8>,
    /// Whether the exchange ran over HTTP/2
    pub http2: bool,
    /// Whether the response asked for the connection to close
    pub connection_close: bool,
}

impl TransportResponse {
    /// First value of a response header, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }
}

/// Executes prepared requests over a pooled connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one attempt, bounded by `timeout`.
    async fn execute(
        &self,
        conn: &Connection,
        request: &PreparedRequest,
        timeout: Duration,
        allow_redirects: bool,
    ) -> Result<TransportResponse, Error>;
}

/// Production transport over reqwest.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReqwestTransport;

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        conn: &Connection,
        request: &PreparedRequest,
        timeout: Duration,
        allow_redirects: bool,
    ) -> Result<TransportResponse, Error> {
        if std::env::var(constants::ENV_NO_NETWORK).is_ok() {
            return Err(Error::network(
                "NO_NETWORK is set; refusing to send over the real network",
            ));
        }

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(
            timeout,
            follow_redirects(conn, request, allow_redirects),
        )
        .await;

        match result {
            Ok(response) => response,
            Err(_) => {
                conn.mark_not_reusable();
                Err(Error::timeout(
                    format!("{} {}", request.method, request.url),
                    started.elapsed().as_millis() as u64,
                ))
            }
        }
    }
}

async fn follow_redirects(
    conn: &Connection,
    request: &PreparedRequest,
    allow_redirects: bool,
) -> Result<TransportResponse, Error> {
    let mut method = request.method.clone();
    let mut url = request.url.clone();
    let mut send_body = true;

    for hop in 0..=MAX_REDIRECTS {
        let response = send_once(conn, request, &method, &url, send_body).await?;

        if !allow_redirects || !is_redirect(response.status) || hop == MAX_REDIRECTS {
            if hop == MAX_REDIRECTS && is_redirect(response.status) {
                warn!(url = %url, "redirect limit reached; returning last response");
            }
            return Ok(response);
        }

        let Some(location) = response.header("Location").map(ToString::to_string) else {
            return Ok(response);
        };

        url = resolve_location(&url, &location)?;

        // 303 (and historically 301/302) switch to GET and drop the body;
        // 307/308 preserve method and body.
        if matches!(response.status, 301 | 302 | 303) && method != constants::HTTP_METHOD_HEAD {
            method = constants::HTTP_METHOD_GET.to_string();
            send_body = false;
        }
        debug!(hop, to = %url, "following redirect");
    }

    unreachable!("redirect loop returns within its hop budget")
}

async fn send_once(
    conn: &Connection,
    request: &PreparedRequest,
    method: &str,
    url: &str,
    send_body: bool,
) -> Result<TransportResponse, Error> {
    let method = reqwest::Method::from_bytes(method.as_bytes())
        .map_err(|_| Error::invalid_option("method", format!("'{method}' is not valid")))?;

    let mut builder = conn.client().request(method, url);

    for (name, value) in &request.headers {
        // Multipart sets its own boundary-bearing content type below
        if matches!(request.body, Body::Multipart(_))
            && name.eq_ignore_ascii_case(constants::HEADER_CONTENT_TYPE)
        {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }

    if send_body {
        builder = match &request.body {
            Body::None => builder,
            Body::Json(value) => builder.body(serde_json::to_vec(value)?),
            Body::Form(pairs) => {
                let encoded: String = pairs
                    .iter()
                    .enumerate()
                    .map(|(i, (k, v))| {
                        let sep = if i > 0 { "&" } else { "" };
                        format!("{sep}{}={}", urlencoding::encode(k), urlencoding::encode(v))
                    })
                    .collect();
                builder.body(encoded)
            }
            Body::Multipart(parts) => {
                let mut form = reqwest::multipart::Form::new();
                for part in parts {
                    form = match &part.kind {
                        PartKind::Text(text) => form.text(part.name.clone(), text.clone()),
                        PartKind::Bytes {
                            data,
                            file_name,
                            content_type,
                        } => {
                            let mut p = reqwest::multipart::Part::bytes(data.clone());
                            if let Some(name) = file_name {
                                p = p.file_name(name.clone());
                            }
                            if let Some(ct) = content_type {
                                p = p.mime_str(ct).map_err(|e| {
                                    Error::invalid_option(
                                        "multipart",
                                        format!("bad content type '{ct}': {e}"),
                                    )
                                })?;
                            }
                            form.part(part.name.clone(), p)
                        }
                    };
                }
                builder.multipart(form)
            }
            Body::Raw(bytes, _) => builder.body(bytes.clone()),
        };
    }

    let response = builder.send().await.map_err(Error::Network)?;

    let http2 = response.version() == reqwest::Version::HTTP_2;
    let status = response.status().as_u16();

    let mut headers: Vec<(String, Vec<String>)> = Vec::new();
    for (name, value) in response.headers() {
        let value = value.to_str().unwrap_or_default().to_string();
        if let Some(slot) = headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name.as_str()))
        {
            slot.1.push(value);
        } else {
            headers.push((name.as_str().to_string(), vec![value]));
        }
    }

    let connection_close = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(constants::HEADER_CONNECTION))
        .is_some_and(|(_, values)| {
            values
                .iter()
                .any(|v| v.to_ascii_lowercase().contains("close"))
        });

    let body = response.bytes().await.map_err(Error::Network)?.to_vec();
    trace!(status, bytes = body.len(), "transport exchange complete");

    Ok(TransportResponse {
        status,
        headers,
        body,
        http2,
        connection_close,
    })
}

const fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

fn resolve_location(base: &str, location: &str) -> Result<String, Error> {
    if crate::uri::is_absolute(location) {
        return Ok(location.to_string());
    }
    let base = url::Url::parse(base)
        .map_err(|e| Error::request(format!("redirect from unparseable URL '{base}': {e}")))?;
    let resolved = base
        .join(location)
        .map_err(|e| Error::request(format!("unresolvable Location '{location}': {e}")))?;
    Ok(resolved.to_string())
}
