//! Retry behavior against a wiremock origin: transient failures, attempt
//! budgets, backoff bounds and per-request classifier overrides.

use courier::mock::MockRegistry;
use courier::pool::{ConnectionPool, PoolConfig};
use courier::{Client, RequestOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

fn isolated_client() -> Client {
    let registry: &'static MockRegistry = Box::leak(Box::new(MockRegistry::new()));
    let pool: &'static ConnectionPool =
        Box::leak(Box::new(ConnectionPool::new(PoolConfig::default())));
    Client::builder().mock_registry(registry).pool(pool).build()
}

/// A responder that fails N times with a given status code, then succeeds
struct FailThenSucceed {
    fail_count: usize,
    fail_status: u16,
    call_count: Arc<AtomicUsize>,
}

impl FailThenSucceed {
    fn new(fail_count: usize, fail_status: u16) -> (Self, Arc<AtomicUsize>) {
        let call_count = Arc::new(AtomicUsize::new(0));
        (
            Self {
                fail_count,
                fail_status,
                call_count: call_count.clone(),
            },
            call_count,
        )
    }
}

impl Respond for FailThenSucceed {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst);
        if count < self.fail_count {
            ResponseTemplate::new(self.fail_status)
        } else {
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true}))
        }
    }
}

#[tokio::test]
async fn retries_on_503_then_succeeds() {
    let server = MockServer::start().await;
    let (responder, calls) = FailThenSucceed::new(2, 503);
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(responder)
        .mount(&server)
        .await;

    let mut opts = RequestOptions::default();
    opts.retries = Some(2);
    opts.retry_delay = Some(Duration::from_millis(10));

    let client = isolated_client();
    let started = Instant::now();
    let response = client
        .send("GET", &format!("{}/flaky", server.uri()), opts)
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(response.status(), 200);
    assert_eq!(response.json_value().unwrap()["ok"], true);

    // Backoff windows: [10,20]ms then [20,40]ms, so at least 30ms of sleep
    assert!(
        elapsed >= Duration::from_millis(30),
        "expected backoff sleeps, finished in {elapsed:?}"
    );
}

#[tokio::test]
async fn zero_retries_means_exactly_one_attempt() {
    let server = MockServer::start().await;
    let (responder, calls) = FailThenSucceed::new(5, 503);
    Mock::given(method("GET"))
        .and(path("/once"))
        .respond_with(responder)
        .mount(&server)
        .await;

    let client = isolated_client();
    let response = client
        .send(
            "GET",
            &format!("{}/once", server.uri()),
            RequestOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // The final retryable response is returned, not raised
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn exhausted_retries_return_last_response() {
    let server = MockServer::start().await;
    let (responder, calls) = FailThenSucceed::new(10, 502);
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(responder)
        .mount(&server)
        .await;

    let mut opts = RequestOptions::default();
    opts.retries = Some(2);
    opts.retry_delay = Some(Duration::from_millis(1));

    let client = isolated_client();
    let response = client
        .send("GET", &format!("{}/down", server.uri()), opts)
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(response.status(), 502);
}

#[tokio::test]
async fn non_retryable_status_returns_immediately() {
    let server = MockServer::start().await;
    let (responder, calls) = FailThenSucceed::new(5, 404);
    Mock::given(method("GET"))
        .and(path("/absent"))
        .respond_with(responder)
        .mount(&server)
        .await;

    let mut opts = RequestOptions::default();
    opts.retries = Some(3);
    opts.retry_delay = Some(Duration::from_millis(1));

    let client = isolated_client();
    let response = client
        .send("GET", &format!("{}/absent", server.uri()), opts)
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn per_request_status_override_widens_classifier() {
    let server = MockServer::start().await;
    let (responder, calls) = FailThenSucceed::new(1, 404);
    Mock::given(method("GET"))
        .and(path("/custom"))
        .respond_with(responder)
        .mount(&server)
        .await;

    let mut opts = RequestOptions::default();
    opts.retries = Some(2);
    opts.retry_delay = Some(Duration::from_millis(1));
    opts.retry_status_codes = Some([404].into_iter().collect());

    let client = isolated_client();
    let response = client
        .send("GET", &format!("{}/custom", server.uri()), opts)
        .await
        .unwrap();

    // 404 retried under the override, then the success lands
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn connect_failures_retry_then_surface() {
    let client = isolated_client();

    let mut opts = RequestOptions::default();
    opts.retries = Some(1);
    opts.retry_delay = Some(Duration::from_millis(1));
    opts.connect_timeout = Some(Duration::from_millis(300));

    let started = Instant::now();
    let err = client
        .send("GET", "http://127.0.0.1:9/refused", opts)
        .await
        .unwrap_err();

    // Two attempts' worth of failures, then the network error surfaces
    // with request context attached
    assert!(err.to_string().contains("/refused") || err.to_string().contains("127.0.0.1"));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn retry_after_header_floors_the_delay() {
    let server = MockServer::start().await;

    struct RateLimited {
        calls: Arc<AtomicUsize>,
    }
    impl Respond for RateLimited {
        fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(429).insert_header("Retry-After", "1")
            } else {
                ResponseTemplate::new(200)
            }
        }
    }

    let calls = Arc::new(AtomicUsize::new(0));
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(RateLimited {
            calls: calls.clone(),
        })
        .mount(&server)
        .await;

    let mut opts = RequestOptions::default();
    opts.retries = Some(1);
    opts.retry_delay = Some(Duration::from_millis(1));

    let client = isolated_client();
    let started = Instant::now();
    let response = client
        .send("GET", &format!("{}/limited", server.uri()), opts)
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    // The server's one-second floor outweighs the millisecond backoff
    assert!(started.elapsed() >= Duration::from_secs(1));
}
