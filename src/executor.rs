//! The request execution pipeline.
//!
//! One send walks: mock interception → cache lookup → conditional headers
//! → pooled transport under the retry loop → 304 merging → stale-if-error
//! fallback → cache store → snapshot attach. Requests running on the
//! cooperative facade (`ctx.is_async()`) skip both cache lookup and store;
//! background stale-while-revalidate tasks refresh entries through the
//! normal store path.

use crate::cache::{CacheManager, CachedEntry, Lookup};
use crate::constants;
use crate::context::{PreparedRequest, RequestContext};
use crate::dns::DnsCache;
use crate::error::Error;
use crate::mock::{MockDecision, MockRegistry, Recorder};
use crate::pool::ConnectionPool;
use crate::profile::{current_rss_bytes, DebugSnapshot, Profiler, SnapshotConfig, Timings};
use crate::response::Response;
use crate::retry::{self, AttemptStatus, RetryOutcome};
use crate::transport::{Transport, TransportResponse};
use crate::uri;
use indexmap::IndexMap;
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Observations the retry loop leaves behind for the snapshot.
#[derive(Debug, Default, Clone, Copy)]
struct AttemptObservations {
    connect_ms: Option<u64>,
    first_byte_ms: Option<u64>,
    connection_reused: bool,
}

/// What one attempt produced, before markers are applied.
struct AttemptResult {
    response: Response,
    /// Set when a 304 was merged with the conditional entry (already
    /// stored; skip the store step)
    revalidated: bool,
}

/// The pipeline choreographer.
///
/// Cheap to clone; clones share the recorder, profiler and cache manager.
#[derive(Clone)]
pub struct Executor {
    transport: Arc<dyn Transport>,
    pool: &'static ConnectionPool,
    dns: &'static DnsCache,
    mock: &'static MockRegistry,
    cache: Option<Arc<CacheManager>>,
    recorder: Arc<Recorder>,
    profiler: Arc<Profiler>,
    snapshot_config: SnapshotConfig,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Build an executor over the given collaborators.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        pool: &'static ConnectionPool,
        dns: &'static DnsCache,
        mock: &'static MockRegistry,
        cache: Option<Arc<CacheManager>>,
        recorder: Arc<Recorder>,
        profiler: Arc<Profiler>,
        snapshot_config: SnapshotConfig,
    ) -> Self {
        Self {
            transport,
            pool,
            dns,
            mock,
            cache,
            recorder,
            profiler,
            snapshot_config,
        }
    }

    /// The recorder observing this executor's exchanges.
    #[must_use]
    pub fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    /// The profiler aggregating this executor's snapshots.
    #[must_use]
    pub fn profiler(&self) -> &Arc<Profiler> {
        &self.profiler
    }

    /// The cache policy layer, when caching is configured.
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<CacheManager>> {
        self.cache.as_ref()
    }

    /// Execute one send to completion.
    ///
    /// # Errors
    ///
    /// Surfaces `InvalidOption` (already raised at context build),
    /// `NetworkError`/`RequestError`/`TimeoutError` after the retry budget,
    /// `Cancelled` when the token fires, and `MockStrayRequest` under
    /// `prevent_stray`. HTTP error responses are returned, not raised.
    pub async fn send(
        &self,
        ctx: Arc<RequestContext>,
        cancel: Option<CancellationToken>,
    ) -> Result<Response, Error> {
        let started = Instant::now();
        let start_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64);
        let rss_before = current_rss_bytes();

        let prepared = ctx.prepared();

        // Mock interception runs before everything else; a matched
        // responder short-circuits cache and transport alike.
        match self.mock.resolve(&prepared) {
            MockDecision::Respond(mock) => {
                debug!(method = %prepared.method, url = %prepared.url, "mock responded");
                let response = Response::from_mock(mock, prepared.url.clone());
                self.recorder.record(
                    &prepared,
                    response.status(),
                    &flatten_headers(response.headers()),
                    response.bytes(),
                );
                let timings = Timings {
                    start_ms,
                    total_ms: started.elapsed().as_millis() as u64,
                    ..Timings::default()
                };
                return Ok(self.finish(&ctx, &prepared, response, timings, rss_before, false));
            }
            MockDecision::Stray => {
                return Err(Error::mock_stray(&prepared.method, &prepared.url));
            }
            MockDecision::PassThrough => {}
        }

        // Cache lookup (sync regime only)
        let cache_plan = self.plan_cache(&ctx, &prepared, cancel.as_ref()).await;
        let (prepared, conditional_entry, fresh_marker) = match cache_plan {
            CachePlan::Deliver(response) => {
                let timings = Timings {
                    start_ms,
                    total_ms: started.elapsed().as_millis() as u64,
                    ..Timings::default()
                };
                return Ok(self.finish(&ctx, &prepared, response, timings, rss_before, false));
            }
            CachePlan::Fetch {
                conditional,
                marker,
            } => {
                let mut prepared = prepared;
                if let Some(entry) = &conditional {
                    for (name, value) in CacheManager::conditional_headers(entry) {
                        crate::options::set_header(&mut prepared.headers, &name, &value);
                    }
                }
                (prepared, conditional, marker)
            }
        };
        let cache_key = self.cache_key_for(&ctx);

        // Best-effort DNS warm-up; failures never abort the send
        let dns_ms = self.warm_dns(&ctx).await;

        // The retry loop
        let observations = Mutex::new(AttemptObservations::default());
        let host_key = uri::host_key(ctx.url());
        let outcome = self
            .run_attempts(
                &ctx,
                &prepared,
                conditional_entry.as_ref(),
                &host_key,
                cancel.as_ref(),
                &observations,
            )
            .await;

        let observations = *observations.lock().unwrap();

        match outcome.result {
            Ok(attempt) => {
                let mut response = attempt.response;

                // Store the fresh response (sync regime, not already
                // stored by the 304 merge)
                if !attempt.revalidated {
                    if let (Some(manager), Some(key)) = (&self.cache, &cache_key) {
                        if manager.should_store(
                            ctx.method(),
                            response.status(),
                            response.headers(),
                            ctx.cache(),
                        ) {
                            let entry = manager.build_entry(
                                response.status(),
                                response.headers().clone(),
                                response.bytes().to_vec(),
                                ctx.headers(),
                                ctx.cache(),
                            );
                            manager.store_entry(key, entry).await;
                            trace!(key = %key, "stored fresh response");
                        }
                    }
                }

                // Marker for delivered provenance
                let marker = if attempt.revalidated {
                    Some(constants::CACHE_STATUS_REVALIDATED)
                } else {
                    fresh_marker
                };
                if let Some(marker) = marker {
                    response.set_header(constants::HEADER_X_CACHE_STATUS, marker);
                }

                self.recorder.record(
                    &prepared,
                    response.status(),
                    &flatten_headers(response.headers()),
                    response.bytes(),
                );

                let total_ms = started.elapsed().as_millis() as u64;
                self.pool.record_request(started.elapsed());
                let timings = Timings {
                    start_ms,
                    dns_ms,
                    connect_ms: observations.connect_ms,
                    tls_ms: None,
                    first_byte_ms: observations.first_byte_ms,
                    total_ms,
                };
                Ok(self.finish(
                    &ctx,
                    &prepared,
                    response,
                    timings,
                    rss_before,
                    observations.connection_reused,
                ))
            }
            Err(error) => {
                if error.is_cancelled() {
                    return Err(error);
                }

                // Terminal transport failure: serve stale if allowed
                if let (Some(manager), Some(key)) = (&self.cache, &cache_key) {
                    if let Some(entry) =
                        manager.stale_if_error_entry(key, ctx.headers()).await
                    {
                        warn!(
                            method = %ctx.method(),
                            url = %ctx.url(),
                            error = %error,
                            "serving stale entry after transport failure"
                        );
                        let response = Response::from_cached_entry(
                            &entry,
                            prepared.url.clone(),
                            constants::CACHE_STATUS_STALE_IF_ERROR,
                        );
                        let timings = Timings {
                            start_ms,
                            dns_ms,
                            total_ms: started.elapsed().as_millis() as u64,
                            ..Timings::default()
                        };
                        return Ok(self.finish(
                            &ctx,
                            &prepared,
                            response,
                            timings,
                            rss_before,
                            false,
                        ));
                    }
                }

                Err(error.with_request_context(ctx.method(), ctx.url().as_str()))
            }
        }
    }

    /// Decide what the cache contributes to this send.
    async fn plan_cache(
        &self,
        ctx: &Arc<RequestContext>,
        prepared: &PreparedRequest,
        cancel: Option<&CancellationToken>,
    ) -> CachePlan {
        let Some(manager) = &self.cache else {
            return CachePlan::Fetch {
                conditional: None,
                marker: None,
            };
        };

        // The cooperative facade bypasses the cache entirely
        if ctx.is_async() {
            return CachePlan::Fetch {
                conditional: None,
                marker: None,
            };
        }

        if !manager.participates(ctx.method(), ctx.cache()) {
            return CachePlan::Fetch {
                conditional: None,
                marker: Some(constants::CACHE_STATUS_BYPASS),
            };
        }

        let key = manager.generate_key(
            ctx.method(),
            ctx.url(),
            ctx.headers(),
            ctx.body(),
            ctx.cache(),
        );

        if ctx.cache().force_refresh.unwrap_or(false) {
            return CachePlan::Fetch {
                conditional: None,
                marker: Some(constants::CACHE_STATUS_REFRESH),
            };
        }

        match manager.lookup(&key, ctx.headers()).await {
            Lookup::Hit(entry) => {
                debug!(key = %key, "cache hit");
                CachePlan::Deliver(Response::from_cached_entry(
                    &entry,
                    prepared.url.clone(),
                    constants::CACHE_STATUS_HIT,
                ))
            }
            Lookup::Stale { entry, swr: true } => {
                debug!(key = %key, "serving stale while revalidating");
                self.spawn_revalidation(ctx, cancel);
                CachePlan::Deliver(Response::from_cached_entry(
                    &entry,
                    prepared.url.clone(),
                    constants::CACHE_STATUS_STALE,
                ))
            }
            Lookup::Stale { entry, swr: false } => {
                if entry.has_validators() {
                    debug!(key = %key, "stale entry; revalidating conditionally");
                    CachePlan::Fetch {
                        conditional: Some(entry),
                        marker: Some(constants::CACHE_STATUS_MISS),
                    }
                } else {
                    CachePlan::Fetch {
                        conditional: None,
                        marker: Some(constants::CACHE_STATUS_MISS),
                    }
                }
            }
            Lookup::Miss => CachePlan::Fetch {
                conditional: None,
                marker: Some(constants::CACHE_STATUS_MISS),
            },
        }
    }

    fn cache_key_for(&self, ctx: &RequestContext) -> Option<String> {
        let manager = self.cache.as_ref()?;
        if ctx.is_async() || !manager.participates(ctx.method(), ctx.cache()) {
            return None;
        }
        Some(manager.generate_key(
            ctx.method(),
            ctx.url(),
            ctx.headers(),
            ctx.body(),
            ctx.cache(),
        ))
    }

    /// Fire-and-forget background revalidation for a stale entry served
    /// under stale-while-revalidate. The refreshed response stores through
    /// the normal sync path. Cancelling the spawning call cancels the
    /// revalidation too, via a child token.
    fn spawn_revalidation(&self, ctx: &Arc<RequestContext>, cancel: Option<&CancellationToken>) {
        let executor = self.clone();
        let revalidation_ctx = Arc::new(ctx.with_force_refresh());
        let child = cancel.map(CancellationToken::child_token);
        tokio::spawn(async move {
            if let Err(e) = executor.send(revalidation_ctx, child).await {
                debug!(error = %e, "background revalidation failed");
            }
        });
    }

    async fn warm_dns(&self, ctx: &RequestContext) -> Option<u64> {
        let host = ctx.url().host_str()?;
        // Literal addresses don't need the resolver
        if host.parse::<std::net::IpAddr>().is_ok() {
            return None;
        }
        let t0 = Instant::now();
        match self.dns.resolve_first(host).await {
            Ok(_) => Some(t0.elapsed().as_millis() as u64),
            Err(e) => {
                trace!(host, error = %e, "dns warm-up failed; transport resolves on its own");
                None
            }
        }
    }

    async fn run_attempts(
        &self,
        ctx: &Arc<RequestContext>,
        prepared: &PreparedRequest,
        conditional_entry: Option<&CachedEntry>,
        host_key: &str,
        cancel: Option<&CancellationToken>,
        observations: &Mutex<AttemptObservations>,
    ) -> RetryOutcome<AttemptResult> {
        let method = ctx.method().to_string();
        let url = ctx.url().to_string();

        retry::execute_with_retry(
            ctx.retry(),
            cancel,
            &method,
            &url,
            |attempt: &AttemptResult| AttemptStatus {
                status: attempt.response.status(),
                retry_after: attempt
                    .response
                    .header(constants::HEADER_RETRY_AFTER)
                    .and_then(retry::parse_retry_after_value),
            },
            |attempt_index| {
                self.one_attempt(
                    ctx,
                    prepared,
                    conditional_entry,
                    host_key,
                    cancel,
                    observations,
                    attempt_index,
                )
            },
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn one_attempt(
        &self,
        ctx: &Arc<RequestContext>,
        prepared: &PreparedRequest,
        conditional_entry: Option<&CachedEntry>,
        host_key: &str,
        cancel: Option<&CancellationToken>,
        observations: &Mutex<AttemptObservations>,
        attempt_index: u32,
    ) -> Result<AttemptResult, Error> {
        trace!(attempt = attempt_index, url = %prepared.url, "attempt starting");

        // Pool checkout, bounded by connect_timeout, cancellable
        let checkout_started = Instant::now();
        let checkout = self.pool.checkout(host_key, ctx.connect_timeout());
        let conn = match cancel {
            Some(token) => {
                tokio::select! {
                    () = token.cancelled() => {
                        return Err(Error::cancelled(ctx.method(), ctx.url().as_str()));
                    }
                    result = checkout => result?,
                }
            }
            None => checkout.await?,
        };
        let connect_ms = checkout_started.elapsed().as_millis() as u64;
        let reused = conn.reused;

        // Transport exchange under the per-attempt timeout, cancellable
        let transport_started = Instant::now();
        let exchange = self
            .transport
            .execute(&conn, prepared, ctx.timeout(), ctx.allow_redirects());
        let result = match cancel {
            Some(token) => {
                tokio::select! {
                    () = token.cancelled() => {
                        // Abort: the connection's stream state is unknown
                        self.pool.release(conn, false);
                        return Err(Error::cancelled(ctx.method(), ctx.url().as_str()));
                    }
                    result = exchange => result,
                }
            }
            None => exchange.await,
        };
        let first_byte_ms = transport_started.elapsed().as_millis() as u64;

        match result {
            Ok(wire) => {
                if wire.http2 {
                    conn.mark_h2();
                }
                let reusable = !wire.connection_close;
                self.pool.release(conn, reusable);

                {
                    let mut obs = observations.lock().unwrap();
                    obs.connect_ms = Some(connect_ms);
                    obs.first_byte_ms = Some(first_byte_ms);
                    obs.connection_reused = reused;
                }

                // A 304 answers the conditional request with the merged
                // cached entry
                if wire.status == 304 {
                    if let (Some(entry), Some(manager)) = (conditional_entry, &self.cache) {
                        return Ok(self
                            .merge_revalidation(ctx, prepared, manager.clone(), entry, &wire)
                            .await);
                    }
                }

                Ok(AttemptResult {
                    response: Response::new(
                        wire.status,
                        prepared.url.clone(),
                        wire.headers,
                        wire.body,
                    ),
                    revalidated: false,
                })
            }
            Err(e) => {
                self.pool.release(conn, false);
                Err(e)
            }
        }
    }

    async fn merge_revalidation(
        &self,
        ctx: &Arc<RequestContext>,
        prepared: &PreparedRequest,
        manager: Arc<CacheManager>,
        entry: &CachedEntry,
        wire: &TransportResponse,
    ) -> AttemptResult {
        let merged = manager.merge_304(entry, &wire.headers, ctx.cache());
        if let Some(key) = self.cache_key_for(ctx) {
            manager.store_entry(&key, merged.clone()).await;
        }
        debug!(url = %prepared.url, "304 merged with cached entry");

        AttemptResult {
            response: Response::new(
                merged.status,
                prepared.url.clone(),
                merged.headers.clone(),
                merged.body.clone(),
            ),
            revalidated: true,
        }
    }

    /// Snapshot, profile and attach; the last step of every successful
    /// delivery.
    fn finish(
        &self,
        ctx: &RequestContext,
        prepared: &PreparedRequest,
        mut response: Response,
        timings: Timings,
        rss_before: Option<i64>,
        connection_reused: bool,
    ) -> Response {
        if !ctx.debug_enabled() && !ctx.profile_enabled() && !self.profiler.is_active() {
            return response;
        }

        let memory_delta = match (rss_before, current_rss_bytes()) {
            (Some(before), Some(after)) => Some(after - before),
            _ => None,
        };

        let snapshot = Arc::new(DebugSnapshot::capture(
            &self.snapshot_config,
            &prepared.method,
            &prepared.url,
            &prepared.headers,
            prepared.body_bytes().as_deref(),
            response.status(),
            &flatten_headers(response.headers()),
            Some(response.bytes()),
            timings,
            memory_delta,
            connection_reused,
        ));

        if ctx.profile_enabled() && !self.profiler.is_active() {
            self.profiler.start();
        }
        self.profiler.record(&snapshot);

        if ctx.debug_enabled() {
            response.attach_debug(snapshot);
        }
        response
    }
}

enum CachePlan {
    /// Serve straight from the cache
    Deliver(Response),
    /// Go to the wire, optionally with a conditional entry and a marker
    /// for the fresh response
    Fetch {
        conditional: Option<CachedEntry>,
        marker: Option<&'static str>,
    },
}

fn flatten_headers(headers: &[(String, Vec<String>)]) -> IndexMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, values)| values.first().map(|v| (name.clone(), v.clone())))
        .collect()
}
