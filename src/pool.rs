//! Shared connection pool keyed by `(scheme, host, port)`.
//!
//! The pool exclusively owns every [`Connection`] and hands out
//! [`PooledConnection`] guards that must be returned through
//! [`ConnectionPool::release`]. Each connection wraps a dedicated transport
//! handle configured with the pool's timeouts; reqwest performs the actual
//! socket work while the pool enforces per-host and global limits,
//! keep-alive lifetimes, HTTP/2 stream sharing and reuse accounting.
//!
//! The process-global instance behind [`global`] is shared by all handlers;
//! configuration changes affect all subsequent checkouts.

use crate::error::Error;
use once_cell::sync::Lazy;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

/// Pool-wide limits and lifetimes.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum connections per host bucket
    pub max_per_host: usize,
    /// Maximum connections across all hosts
    pub max_connections: usize,
    /// Idle connections older than this are discarded
    pub keep_alive_timeout: Duration,
    /// Connections past this age are discarded on release
    pub max_lifetime: Duration,
    /// Concurrent streams allowed on one HTTP/2 connection
    pub max_h2_streams: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_per_host: 6,
            max_connections: 100,
            keep_alive_timeout: Duration::from_secs(60),
            max_lifetime: Duration::from_secs(300),
            max_h2_streams: 8,
        }
    }
}

/// One pooled transport connection.
///
/// `active_count` tracks concurrent streams; it exceeds 1 only on hosts
/// known to negotiate HTTP/2. A connection with `reusable == false` is
/// closed on release regardless of its age.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    host_key: String,
    client: reqwest::Client,
    created_at: Instant,
    last_used_at: Mutex<Instant>,
    active_count: AtomicUsize,
    reusable: AtomicBool,
    h2: AtomicBool,
}

impl Connection {
    /// The transport handle for executing requests.
    #[must_use]
    pub const fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// The `(scheme, host, port)` bucket this connection belongs to.
    #[must_use]
    pub fn host_key(&self) -> &str {
        &self.host_key
    }

    /// Stable identifier, unique within the pool's lifetime.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Mark the connection as not safe to reuse (e.g. the response carried
    /// `Connection: close` or the exchange was aborted).
    pub fn mark_not_reusable(&self) {
        self.reusable.store(false, Ordering::SeqCst);
    }

    /// Record that this host negotiated HTTP/2, enabling stream sharing.
    pub fn mark_h2(&self) {
        self.h2.store(true, Ordering::SeqCst);
    }

    /// Whether this connection multiplexes streams.
    #[must_use]
    pub fn is_h2(&self) -> bool {
        self.h2.load(Ordering::SeqCst)
    }

    fn is_reusable(&self) -> bool {
        self.reusable.load(Ordering::SeqCst)
    }

    fn within_lifetime(&self, config: &PoolConfig) -> bool {
        self.created_at.elapsed() <= config.max_lifetime
    }

    fn idle_expired(&self, config: &PoolConfig) -> bool {
        self.last_used_at
            .lock()
            .map(|t| t.elapsed() > config.keep_alive_timeout)
            .unwrap_or(true)
    }

    fn touch(&self) {
        if let Ok(mut t) = self.last_used_at.lock() {
            *t = Instant::now();
        }
    }
}

/// Checkout guard. Must be given back via [`ConnectionPool::release`];
/// dropping it un-released returns the connection as non-reusable.
pub struct PooledConnection {
    conn: Option<Arc<Connection>>,
    pool: &'static ConnectionPool,
    /// Whether this checkout reused an existing connection
    pub reused: bool,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("reused", &self.reused)
            .finish_non_exhaustive()
    }
}

impl std::ops::Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("pooled connection accessed after release")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            // Unreleased guard: a panic or early return skipped release.
            conn.mark_not_reusable();
            self.pool.give_back(&conn);
        }
    }
}

/// Per-host bucket: idle FIFO plus live accounting.
#[derive(Debug, Default)]
struct HostPool {
    idle: VecDeque<Arc<Connection>>,
    active: Vec<Arc<Connection>>,
    /// Set once the host is seen negotiating HTTP/2
    h2_known: bool,
    total: usize,
}

#[derive(Debug, Default)]
struct PoolState {
    hosts: HashMap<String, HostPool>,
    total: usize,
    next_id: u64,
}

/// Reuse and latency counters, updated by the executor.
#[derive(Debug, Default)]
struct PoolMetrics {
    connections_created: AtomicU64,
    connections_reused: AtomicU64,
    total_requests: AtomicU64,
    total_latency_ms: AtomicU64,
}

/// Snapshot of pool metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoolStats {
    pub connections_created: u64,
    pub connections_reused: u64,
    pub total_requests: u64,
    pub average_latency_ms: f64,
    /// `reused / (created + reused)`; zero when nothing has happened
    pub reuse_rate: f64,
    pub open_connections: usize,
    pub idle_connections: usize,
}

/// The shared connection pool.
#[derive(Debug)]
pub struct ConnectionPool {
    config: Mutex<PoolConfig>,
    state: Mutex<PoolState>,
    released: Notify,
    metrics: PoolMetrics,
}

static GLOBAL: Lazy<ConnectionPool> = Lazy::new(|| ConnectionPool::new(PoolConfig::default()));

/// The process-global pool shared by all handlers.
#[must_use]
pub fn global() -> &'static ConnectionPool {
    &GLOBAL
}

impl ConnectionPool {
    /// Create a pool with the given limits.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config: Mutex::new(config),
            state: Mutex::new(PoolState::default()),
            released: Notify::new(),
            metrics: PoolMetrics::default(),
        }
    }

    /// Replace the pool configuration. Affects all subsequent checkouts.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn configure(&self, config: PoolConfig) {
        *self.config.lock().unwrap() = config;
    }

    /// Current configuration snapshot.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn config(&self) -> PoolConfig {
        self.config.lock().unwrap().clone()
    }

    /// Check out a connection for `host_key`, waiting up to
    /// `connect_timeout` for capacity.
    ///
    /// Order of preference: a reusable idle connection, an HTTP/2
    /// connection with stream budget, a freshly created connection under
    /// the per-host and global caps, then a bounded wait for a release.
    ///
    /// # Errors
    ///
    /// Returns a `NetworkError`-kind `PoolExhausted` failure when no
    /// capacity frees up within `connect_timeout`, or when the transport
    /// handle cannot be built.
    pub async fn checkout(
        &'static self,
        host_key: &str,
        connect_timeout: Duration,
    ) -> Result<PooledConnection, Error> {
        let deadline = Instant::now() + connect_timeout;

        loop {
            if let Some(guard) = self.try_checkout(host_key, connect_timeout)? {
                return Ok(guard);
            }

            let now = Instant::now();
            if now >= deadline {
                let waited = connect_timeout.as_millis() as u64;
                return Err(Error::pool_exhausted(host_key, waited));
            }

            // Wait for a release, bounded by the remaining budget
            let notified = self.released.notified();
            if tokio::time::timeout(deadline - now, notified).await.is_err() {
                let waited = connect_timeout.as_millis() as u64;
                return Err(Error::pool_exhausted(host_key, waited));
            }
        }
    }

    fn try_checkout(
        &'static self,
        host_key: &str,
        connect_timeout: Duration,
    ) -> Result<Option<PooledConnection>, Error> {
        let config = self.config();
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;
        let host = state.hosts.entry(host_key.to_string()).or_default();

        // 1. Reuse an idle connection, discarding expired ones on the way
        while let Some(conn) = host.idle.pop_front() {
            if conn.is_reusable() && conn.within_lifetime(&config) && !conn.idle_expired(&config) {
                conn.active_count.store(1, Ordering::SeqCst);
                conn.touch();
                host.active.push(conn.clone());
                self.metrics.connections_reused.fetch_add(1, Ordering::SeqCst);
                trace!(host = host_key, id = conn.id, "reusing idle connection");
                return Ok(Some(PooledConnection {
                    conn: Some(conn),
                    pool: self,
                    reused: true,
                }));
            }
            host.total = host.total.saturating_sub(1);
            state.total = state.total.saturating_sub(1);
            debug!(host = host_key, id = conn.id, "discarded expired idle connection");
        }

        // 2. Share a stream on a multiplexing connection
        if host.h2_known {
            if let Some(conn) = host
                .active
                .iter()
                .find(|c| c.is_h2() && c.active_count.load(Ordering::SeqCst) < config.max_h2_streams)
            {
                conn.active_count.fetch_add(1, Ordering::SeqCst);
                conn.touch();
                self.metrics.connections_reused.fetch_add(1, Ordering::SeqCst);
                trace!(host = host_key, id = conn.id, "sharing h2 stream");
                return Ok(Some(PooledConnection {
                    conn: Some(conn.clone()),
                    pool: self,
                    reused: true,
                }));
            }
        }

        // 3. Create a new connection under the caps
        if host.total < config.max_per_host && state.total < config.max_connections {
            let id = state.next_id;
            state.next_id += 1;

            // Redirects are followed by the transport layer so the
            // per-request directive can be honored.
            let client = reqwest::Client::builder()
                .connect_timeout(connect_timeout)
                .pool_max_idle_per_host(1)
                .redirect(reqwest::redirect::Policy::none())
                .cookie_store(true)
                .build()
                .map_err(|e| Error::network(format!("failed to build transport handle: {e}")))?;

            let conn = Arc::new(Connection {
                id,
                host_key: host_key.to_string(),
                client,
                created_at: Instant::now(),
                last_used_at: Mutex::new(Instant::now()),
                active_count: AtomicUsize::new(1),
                reusable: AtomicBool::new(true),
                h2: AtomicBool::new(false),
            });
            host.active.push(conn.clone());
            host.total += 1;
            state.total += 1;
            self.metrics.connections_created.fetch_add(1, Ordering::SeqCst);
            debug!(host = host_key, id, "created connection");
            return Ok(Some(PooledConnection {
                conn: Some(conn),
                pool: self,
                reused: false,
            }));
        }

        Ok(None)
    }

    /// Return a checked-out connection.
    ///
    /// Reusable connections within their lifetime budget go back to the
    /// idle queue; everything else closes. Idle connections past keep-alive
    /// are swept opportunistically.
    pub fn release(&'static self, mut guard: PooledConnection, reusable: bool) {
        if let Some(conn) = guard.conn.take() {
            if !reusable {
                conn.mark_not_reusable();
            }
            self.give_back(&conn);
        }
    }

    fn give_back(&'static self, conn: &Arc<Connection>) {
        let config = self.config();
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;

        let Some(host) = state.hosts.get_mut(&conn.host_key) else {
            return;
        };

        if conn.is_h2() {
            host.h2_known = true;
        }

        let remaining = conn
            .active_count
            .fetch_sub(1, Ordering::SeqCst)
            .saturating_sub(1);
        conn.touch();

        if remaining == 0 {
            host.active.retain(|c| c.id != conn.id);

            if conn.is_reusable() && conn.within_lifetime(&config) {
                host.idle.push_back(conn.clone());
            } else {
                host.total = host.total.saturating_sub(1);
                state.total = state.total.saturating_sub(1);
                debug!(host = %conn.host_key, id = conn.id, "closed connection on release");
            }

            // Opportunistic sweep of idle connections past keep-alive
            let before = host.idle.len();
            host.idle
                .retain(|c| !c.idle_expired(&config) && c.within_lifetime(&config));
            let swept = before - host.idle.len();
            if swept > 0 {
                host.total = host.total.saturating_sub(swept);
                state.total = state.total.saturating_sub(swept);
                trace!(host = %conn.host_key, swept, "swept expired idle connections");
            }
        }

        drop(state);
        self.released.notify_waiters();
    }

    /// Record one finished request for the reuse/latency metrics.
    pub fn record_request(&self, latency: Duration) {
        self.metrics.total_requests.fetch_add(1, Ordering::SeqCst);
        self.metrics
            .total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Preallocate up to `count` idle connections for a host.
    ///
    /// Stops early at the per-host or global cap.
    ///
    /// # Errors
    ///
    /// Returns an error if a transport handle cannot be built.
    pub fn warmup(&'static self, host_key: &str, count: usize) -> Result<usize, Error> {
        let config = self.config();
        let mut created = 0;
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;
        let host = state.hosts.entry(host_key.to_string()).or_default();

        while created < count
            && host.total < config.max_per_host
            && state.total < config.max_connections
        {
            let id = state.next_id;
            state.next_id += 1;

            let client = reqwest::Client::builder()
                .connect_timeout(config.keep_alive_timeout)
                .pool_max_idle_per_host(1)
                .redirect(reqwest::redirect::Policy::none())
                .cookie_store(true)
                .build()
                .map_err(|e| Error::network(format!("failed to build transport handle: {e}")))?;

            host.idle.push_back(Arc::new(Connection {
                id,
                host_key: host_key.to_string(),
                client,
                created_at: Instant::now(),
                last_used_at: Mutex::new(Instant::now()),
                active_count: AtomicUsize::new(0),
                reusable: AtomicBool::new(true),
                h2: AtomicBool::new(false),
            }));
            host.total += 1;
            state.total += 1;
            self.metrics.connections_created.fetch_add(1, Ordering::SeqCst);
            created += 1;
        }

        debug!(host = host_key, created, "warmed up connections");
        Ok(created)
    }

    /// Current metrics snapshot.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let created = self.metrics.connections_created.load(Ordering::SeqCst);
        let reused = self.metrics.connections_reused.load(Ordering::SeqCst);
        let requests = self.metrics.total_requests.load(Ordering::SeqCst);
        let latency = self.metrics.total_latency_ms.load(Ordering::SeqCst);

        let state = self.state.lock().unwrap();
        let idle: usize = state.hosts.values().map(|h| h.idle.len()).sum();

        PoolStats {
            connections_created: created,
            connections_reused: reused,
            total_requests: requests,
            average_latency_ms: if requests == 0 {
                0.0
            } else {
                latency as f64 / requests as f64
            },
            reuse_rate: if created + reused == 0 {
                0.0
            } else {
                reused as f64 / (created + reused) as f64
            },
            open_connections: state.total,
            idle_connections: idle,
        }
    }

    /// Close every connection. In-flight guards keep their connections
    /// alive until released, at which point they close.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn close_all(&self) {
        let mut state = self.state.lock().unwrap();
        for host in state.hosts.values() {
            for conn in host.active.iter().chain(host.idle.iter()) {
                conn.mark_not_reusable();
            }
        }
        state.hosts.clear();
        state.total = 0;
        self.released.notify_waiters();
        warn!("connection pool closed");
    }

    /// Close everything and zero the metrics. Test isolation hook.
    pub fn reset(&self) {
        self.close_all();
        self.metrics.connections_created.store(0, Ordering::SeqCst);
        self.metrics.connections_reused.store(0, Ordering::SeqCst);
        self.metrics.total_requests.store(0, Ordering::SeqCst);
        self.metrics.total_latency_ms.store(0, Ordering::SeqCst);
    }
}
