//! Debug snapshots and profiling through real exchanges.

use courier::mock::MockRegistry;
use courier::pool::{ConnectionPool, PoolConfig};
use courier::profile::SnapshotConfig;
use courier::{Client, RequestOptions};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn isolated_client() -> Client {
    let registry: &'static MockRegistry = Box::leak(Box::new(MockRegistry::new()));
    let pool: &'static ConnectionPool =
        Box::leak(Box::new(ConnectionPool::new(PoolConfig::default())));
    Client::builder().mock_registry(registry).pool(pool).build()
}

#[tokio::test]
async fn snapshot_attaches_with_timings_and_redaction() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dbg"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(10))
                .set_body_string("payload"),
        )
        .mount(&server)
        .await;

    let client = isolated_client();
    let mut opts = RequestOptions::default();
    opts.debug = Some(true);
    opts.token = Some("super-secret-token".into());
    opts.headers.insert("X-API-Key".into(), "k-123".into());

    let response = client
        .send("GET", &format!("{}/dbg", server.uri()), opts)
        .await
        .unwrap();

    let snapshot = response.debug_info().expect("snapshot attached");
    assert_eq!(snapshot.method, "GET");
    assert_eq!(snapshot.status, 200);
    assert!(snapshot.timings.total_ms >= 10);
    assert!(snapshot.timings.connect_ms.is_some());
    assert!(snapshot.timings.first_byte_ms.is_some());

    // Credentials are replaced by the redaction literal
    assert_eq!(snapshot.request_headers["Authorization"], "***");
    assert_eq!(snapshot.request_headers["X-API-Key"], "***");
    let json = snapshot.to_json();
    assert!(!json.to_string().contains("super-secret-token"));
    assert!(!json.to_string().contains("k-123"));

    // The wire still saw the real values — redaction is snapshot-only
    assert_eq!(response.text(), "payload");
}

#[tokio::test]
async fn body_truncation_respects_cap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_string("A".repeat(10_000)))
        .mount(&server)
        .await;

    let registry: &'static MockRegistry = Box::leak(Box::new(MockRegistry::new()));
    let pool: &'static ConnectionPool =
        Box::leak(Box::new(ConnectionPool::new(PoolConfig::default())));
    let client = Client::builder()
        .mock_registry(registry)
        .pool(pool)
        .snapshot_config(SnapshotConfig {
            body_cap: 64,
            ..SnapshotConfig::default()
        })
        .build();

    let mut opts = RequestOptions::default();
    opts.debug = Some(true);
    let response = client
        .send("GET", &format!("{}/big", server.uri()), opts)
        .await
        .unwrap();

    let snapshot = response.debug_info().unwrap();
    let captured = snapshot.response_body.as_deref().unwrap();
    assert!(captured.contains("bytes truncated"));
    assert!(captured.len() < 200);
    // The delivered body is untouched
    assert_eq!(response.bytes().len(), 10_000);
}

#[tokio::test]
async fn profiler_aggregates_opted_in_sends() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(5)))
        .mount(&server)
        .await;

    let client = isolated_client();
    let url = format!("{}/p", server.uri());

    let mut opts = RequestOptions::default();
    opts.profile = Some(true);
    for _ in 0..3 {
        client.send("GET", &url, opts.clone()).await.unwrap();
    }

    let summary = client.profiler().summary();
    assert_eq!(summary.count, 3);
    assert!(summary.max_ms >= summary.min_ms);
    assert!(summary.avg_ms > 0.0);
}

#[tokio::test]
async fn snapshot_marks_reused_connection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reuse"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = isolated_client();
    let url = format!("{}/reuse", server.uri());
    let mut opts = RequestOptions::default();
    opts.debug = Some(true);

    let first = client.send("GET", &url, opts.clone()).await.unwrap();
    assert!(!first.debug_info().unwrap().connection_reused);

    let second = client.send("GET", &url, opts).await.unwrap();
    assert!(second.debug_info().unwrap().connection_reused);
}
