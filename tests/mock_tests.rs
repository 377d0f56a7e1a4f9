//! Mock interception and recording through the full client surface.

use courier::mock::{MockRegistry, MockResponse};
use courier::pool::{ConnectionPool, PoolConfig};
use courier::{Client, ErrorKind, RequestOptions};
use serde_json::json;

fn client_with_registry() -> (Client, &'static MockRegistry) {
    let registry: &'static MockRegistry = Box::leak(Box::new(MockRegistry::new()));
    let pool: &'static ConnectionPool =
        Box::leak(Box::new(ConnectionPool::new(PoolConfig::default())));
    let client = Client::builder().mock_registry(registry).pool(pool).build();
    (client, registry)
}

#[tokio::test]
async fn sequence_with_prevent_stray() {
    let (client, registry) = client_with_registry();
    registry
        .register_sequence(
            "GET https://api/users/*",
            vec![
                MockResponse::json(200, &json!({"id": 1})),
                MockResponse::json(200, &json!({"id": 2})),
                MockResponse::new(404),
            ],
            false,
            None,
        )
        .unwrap();
    registry.prevent_stray(true);

    let first = client
        .send("GET", "https://api/users/a", RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(first.json_value().unwrap()["id"], 1);

    let second = client
        .send("GET", "https://api/users/b", RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(second.json_value().unwrap()["id"], 2);

    let third = client
        .send("GET", "https://api/users/c", RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(third.status(), 404);

    // Any URL not covered by a pattern is now a stray
    let err = client
        .send("GET", "https://api/other", RequestOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MockStray);
}

#[tokio::test]
async fn callable_responder_reflects_request() {
    let (client, registry) = client_with_registry();
    registry
        .register_fn(
            "POST https://api/echo",
            |req: &courier::PreparedRequest| {
                let body = req.body_bytes().unwrap_or_default();
                MockResponse::new(200)
                    .with_header("Content-Type", "application/json")
                    .with_body(body)
            },
        )
        .unwrap();

    let mut opts = RequestOptions::default();
    opts.json = Some(json!({"hello": "world"}));

    let response = client
        .send("POST", "https://api/echo", opts)
        .await
        .unwrap();
    assert_eq!(response.json_value().unwrap()["hello"], "world");
}

#[tokio::test]
async fn recorder_captures_replays_and_asserts() {
    let (client, registry) = client_with_registry();
    registry
        .register_sequence(
            "GET https://api/data",
            vec![
                MockResponse::json(200, &json!({"rev": 1})),
                MockResponse::json(200, &json!({"rev": 2})),
            ],
            false,
            None,
        )
        .unwrap();

    client.recorder().start();
    for _ in 0..2 {
        client
            .send("GET", "https://api/data", RequestOptions::default())
            .await
            .unwrap();
    }
    client.recorder().stop();

    client.recorder().assert_sent("GET https://api/data", Some(2));
    client.recorder().assert_sent_count(2);
    client.recorder().assert_not_sent("POST https://api/**");

    // Export, import into a fresh recorder: identity
    let exported = client.recorder().export_json().unwrap();
    let restored = courier::mock::Recorder::new();
    restored.import_json(&exported).unwrap();
    assert_eq!(restored.recorded(), client.recorder().recorded());

    // Replay into a fresh registry: same sequence plays back
    let (replay_client, replay_registry) = client_with_registry();
    restored.replay(replay_registry).unwrap();
    replay_registry.prevent_stray(true);

    let first = replay_client
        .send("GET", "https://api/data", RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(first.json_value().unwrap()["rev"], 1);
    let second = replay_client
        .send("GET", "https://api/data", RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(second.json_value().unwrap()["rev"], 2);
}

#[tokio::test]
async fn fallback_callable_handles_all_requests() {
    let (client, registry) = client_with_registry();
    registry.set_fallback(|req: &courier::PreparedRequest| {
        MockResponse::new(200).with_body(format!("{} {}", req.method, req.url).into_bytes())
    });

    let response = client
        .send("DELETE", "https://anything.example.com/x", RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(response.text(), "DELETE https://anything.example.com/x");
}

#[tokio::test]
async fn reset_restores_pass_through() {
    let (client, registry) = client_with_registry();
    registry.prevent_stray(true);

    let err = client
        .send("GET", "https://api/x", RequestOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MockStray);

    registry.reset();

    // Pass-through now reaches the (unreachable) transport instead of the
    // mock layer; expect a transport-shaped failure, not a stray
    let mut opts = RequestOptions::default();
    opts.connect_timeout = Some(std::time::Duration::from_millis(200));
    let err = client
        .send("GET", "http://127.0.0.1:9/x", opts)
        .await
        .unwrap_err();
    assert_ne!(err.kind(), ErrorKind::MockStray);
}

#[tokio::test]
async fn mock_short_circuits_cache_and_transport() {
    let registry: &'static MockRegistry = Box::leak(Box::new(MockRegistry::new()));
    let pool: &'static ConnectionPool =
        Box::leak(Box::new(ConnectionPool::new(PoolConfig::default())));
    registry
        .register("GET https://api/cached", MockResponse::json(200, &json!({"mock": 1})))
        .unwrap();

    let client = Client::builder()
        .mock_registry(registry)
        .pool(pool)
        .cache(courier::cache::CacheConfig::default())
        .build();

    let response = client
        .send("GET", "https://api/cached", RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(response.json_value().unwrap()["mock"], 1);
    // Mocked deliveries carry no cache marker and store nothing
    assert_eq!(response.cache_status(), None);
    assert_eq!(client.cache().unwrap().stats().await.total_entries, 0);
}
