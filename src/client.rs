//! The request handler: scoped defaults wired to the shared services.
//!
//! A [`Client`] owns its default options, an optional per-handler cache,
//! a recorder and a profiler, and shares the process-global connection
//! pool, DNS cache and mock registry. Handler state is only ever a
//! default — every send reads from its own immutable
//! [`RequestContext`](crate::context::RequestContext), so concurrent tasks
//! sharing a handler cannot interfere.

use crate::cache::{CacheConfig, CacheManager, CacheStore, MemoryStore};
use crate::context::RequestContext;
use crate::dns::{self, DnsCache};
use crate::error::Error;
use crate::executor::Executor;
use crate::mock::{self, MockRegistry, Recorder};
use crate::options::RequestOptions;
use crate::pool::{self, ConnectionPool};
use crate::profile::{DebugSnapshot, Profiler, SnapshotConfig};
use crate::response::Response;
use crate::task::Task;
use crate::transport::{ReqwestTransport, Transport};
use std::sync::{Arc, RwLock};

/// Builder for [`Client`].
pub struct ClientBuilder {
    defaults: RequestOptions,
    cache: Option<Arc<CacheManager>>,
    transport: Arc<dyn Transport>,
    pool: &'static ConnectionPool,
    dns: &'static DnsCache,
    mock: &'static MockRegistry,
    snapshot_config: SnapshotConfig,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            defaults: RequestOptions::default(),
            cache: None,
            transport: Arc::new(ReqwestTransport),
            pool: pool::global(),
            dns: dns::global(),
            mock: mock::global(),
            snapshot_config: SnapshotConfig::default(),
        }
    }
}

impl ClientBuilder {
    /// Handler-scoped default options, merged under every call's options.
    #[must_use]
    pub fn defaults(mut self, defaults: RequestOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Enable caching with an in-memory store.
    #[must_use]
    pub fn cache(self, config: CacheConfig) -> Self {
        self.cache_with_store(Arc::new(MemoryStore::default()), config)
    }

    /// Enable caching over a specific store backend.
    #[must_use]
    pub fn cache_with_store(mut self, store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        self.cache = Some(Arc::new(CacheManager::new(store, config)));
        self
    }

    /// Share an existing cache manager between handlers.
    #[must_use]
    pub fn shared_cache(mut self, manager: Arc<CacheManager>) -> Self {
        self.cache = Some(manager);
        self
    }

    /// Replace the transport (tests).
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Use a non-global connection pool (tests).
    #[must_use]
    pub fn pool(mut self, pool: &'static ConnectionPool) -> Self {
        self.pool = pool;
        self
    }

    /// Use a non-global mock registry (tests).
    #[must_use]
    pub fn mock_registry(mut self, mock: &'static MockRegistry) -> Self {
        self.mock = mock;
        self
    }

    /// Snapshot capture settings.
    #[must_use]
    pub fn snapshot_config(mut self, config: SnapshotConfig) -> Self {
        self.snapshot_config = config;
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> Client {
        let executor = Executor::new(
            self.transport,
            self.pool,
            self.dns,
            self.mock,
            self.cache,
            Arc::new(Recorder::new()),
            Arc::new(Profiler::new()),
            self.snapshot_config,
        );
        Client {
            defaults: self.defaults,
            executor,
            last_snapshot: RwLock::new(None),
        }
    }
}

/// A request handler.
pub struct Client {
    defaults: RequestOptions,
    executor: Executor,
    /// Kept for compatibility with callers that read "the last snapshot"
    /// off the handler. Not safe under concurrent use — the per-response
    /// attachment is authoritative.
    last_snapshot: RwLock<Option<Arc<DebugSnapshot>>>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// A handler with library defaults and no cache.
    #[must_use]
    pub fn new() -> Self {
        ClientBuilder::default().build()
    }

    /// Start building a configured handler.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Issue a request and await its completion in the caller's task.
    ///
    /// This is the cache-enabled path: lookups, conditional revalidation
    /// and stores all participate per configuration.
    ///
    /// # Errors
    ///
    /// See [`Executor::send`]; HTTP error responses are returned, not
    /// raised.
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        options: RequestOptions,
    ) -> Result<Response, Error> {
        let merged = self.defaults.merge(&options);
        let ctx = Arc::new(RequestContext::build(&merged, Some(method), uri)?);
        let response = self.executor.send(ctx, None).await?;

        if let Some(snapshot) = response.debug_info() {
            if let Ok(mut last) = self.last_snapshot.write() {
                *last = Some(snapshot.clone());
            }
        }
        Ok(response)
    }

    /// Issue a request described by a free-form JSON mapping.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOption` when the mapping does not validate.
    pub async fn send_json(
        &self,
        method: &str,
        uri: &str,
        options: &serde_json::Value,
    ) -> Result<Response, Error> {
        self.send(method, uri, RequestOptions::from_json(options)?)
            .await
    }

    /// Issue a request as a detached cooperative task.
    ///
    /// The task bypasses the cache entirely (no lookup, no store) and
    /// carries a cancellation token: [`Task::cancel`] aborts the send at
    /// its next suspension point.
    #[must_use]
    pub fn send_task(&self, method: &str, uri: &str, options: RequestOptions) -> Task<Response> {
        let merged = self.defaults.merge(&options);
        let ctx = RequestContext::build(&merged, Some(method), uri).map(|ctx| ctx.into_async());
        let executor = self.executor.clone();

        Task::spawn(move |token| async move {
            let ctx = Arc::new(ctx?);
            executor.send(ctx, Some(token)).await
        })
    }

    /// The recorder observing this handler's exchanges.
    #[must_use]
    pub fn recorder(&self) -> &Arc<Recorder> {
        self.executor.recorder()
    }

    /// The profiler aggregating this handler's snapshots.
    #[must_use]
    pub fn profiler(&self) -> &Arc<Profiler> {
        self.executor.profiler()
    }

    /// The cache policy layer, when caching is configured.
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<CacheManager>> {
        self.executor.cache()
    }

    /// The handler-scoped default options.
    #[must_use]
    pub const fn defaults(&self) -> &RequestOptions {
        &self.defaults
    }

    /// The last debug snapshot any send on this handler produced.
    ///
    /// Unsafe under concurrent async use (last writer wins); prefer
    /// [`Response::debug_info`].
    #[must_use]
    pub fn last_snapshot(&self) -> Option<Arc<DebugSnapshot>> {
        self.last_snapshot.read().ok().and_then(|s| s.clone())
    }
}
