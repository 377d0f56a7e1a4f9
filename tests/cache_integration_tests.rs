//! End-to-end cache behavior against a wiremock origin: hits, conditional
//! revalidation, stale-if-error and force-refresh.

use courier::cache::{CacheConfig, CacheManager};
use courier::mock::MockRegistry;
use courier::pool::{ConnectionPool, PoolConfig};
use courier::{Client, RequestOptions};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn isolated_client_with_cache(config: CacheConfig) -> Client {
    let registry: &'static MockRegistry = Box::leak(Box::new(MockRegistry::new()));
    let pool: &'static ConnectionPool =
        Box::leak(Box::new(ConnectionPool::new(PoolConfig::default())));
    Client::builder()
        .mock_registry(registry)
        .pool(pool)
        .cache(config)
        .build()
}

fn cache_config_with_ttl(ttl_secs: u64) -> CacheConfig {
    CacheConfig {
        default_ttl: Duration::from_secs(ttl_secs),
        ..CacheConfig::default()
    }
}

#[tokio::test]
async fn basic_get_then_hit_skips_transport() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"x": 1})))
        .expect(1) // the second send must not reach the origin
        .mount(&server)
        .await;

    let client = isolated_client_with_cache(cache_config_with_ttl(60));
    let url = format!("{}/a", server.uri());

    let first = client
        .send("GET", &url, RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(first.json_value().unwrap()["x"], 1);
    assert_eq!(first.cache_status(), Some("MISS"));

    let second = client
        .send("GET", &url, RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(second.json_value().unwrap()["x"], 1);
    assert_eq!(second.cache_status(), Some("HIT"));

    server.verify().await;
}

#[tokio::test]
async fn conditional_revalidation_merges_304() {
    let server = MockServer::start().await;

    // First exchange: a response that goes stale after one second
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v1\"")
                .insert_header("Cache-Control", "max-age=1")
                .set_body_string("original body"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = isolated_client_with_cache(cache_config_with_ttl(60));
    let url = format!("{}/b", server.uri());

    let first = client
        .send("GET", &url, RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(first.status(), 200);

    // Let the entry go stale past its max-age
    tokio::time::sleep(Duration::from_secs(2)).await;

    // The revalidation request must carry the validator; answer 304 with a
    // fresh lifetime
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .and(header("If-None-Match", "\"v1\""))
        .respond_with(
            ResponseTemplate::new(304).insert_header("Cache-Control", "max-age=60"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let second = client
        .send("GET", &url, RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(second.text(), "original body");
    assert_eq!(second.cache_status(), Some("REVALIDATED"));
    server.verify().await;

    // Now fresh again for 60s: a third send is a pure hit
    let third = client
        .send("GET", &url, RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(third.cache_status(), Some("HIT"));
    assert_eq!(third.text(), "original body");
}

#[tokio::test]
async fn stale_if_error_serves_cached_entry() {
    let config = CacheConfig {
        sie_window: Some(Duration::from_secs(300)),
        ..CacheConfig::default()
    };
    let client = isolated_client_with_cache(config);

    // Nothing listens on this port; the transport fails to connect
    let url = "http://127.0.0.1:9/sie";

    // Seed a stale entry for exactly this request
    let manager: &Arc<CacheManager> = client.cache().unwrap();
    let ctx_opts = RequestOptions::default();
    let ctx = courier::RequestContext::build(&ctx_opts, Some("GET"), url).unwrap();
    let key = manager.generate_key(
        ctx.method(),
        ctx.url(),
        ctx.headers(),
        ctx.body(),
        ctx.cache(),
    );
    let mut entry = manager.build_entry(
        200,
        vec![("Content-Type".into(), vec!["text/plain".into()])],
        b"stale but served".to_vec(),
        ctx.headers(),
        ctx.cache(),
    );
    // Make it five seconds stale
    entry.fresh_until = entry.stored_at.saturating_sub(5);
    entry.stored_at = entry.fresh_until;
    manager.store_entry(&key, entry).await;

    let mut opts = RequestOptions::default();
    opts.connect_timeout = Some(Duration::from_millis(500));

    let response = client.send("GET", url, opts).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text(), "stale but served");
    assert_eq!(response.cache_status(), Some("STALE-IF-ERROR"));
}

#[tokio::test]
async fn transport_error_without_stale_entry_surfaces() {
    let client = isolated_client_with_cache(CacheConfig::default());
    let mut opts = RequestOptions::default();
    opts.connect_timeout = Some(Duration::from_millis(500));

    let err = client
        .send("GET", "http://127.0.0.1:9/none", opts)
        .await
        .unwrap_err();
    // Context names the failing send
    assert!(err.to_string().contains("/none"));
}

#[tokio::test]
async fn force_refresh_skips_lookup_but_stores() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/r"))
        .respond_with(ResponseTemplate::new(200).set_body_string("v2"))
        .expect(1)
        .mount(&server)
        .await;

    let client = isolated_client_with_cache(cache_config_with_ttl(60));
    let url = format!("{}/r", server.uri());

    // Seed an existing fresh entry with different content
    let manager = client.cache().unwrap();
    let ctx = courier::RequestContext::build(&RequestOptions::default(), Some("GET"), &url)
        .unwrap();
    let key = manager.generate_key(
        ctx.method(),
        ctx.url(),
        ctx.headers(),
        ctx.body(),
        ctx.cache(),
    );
    let entry = manager.build_entry(
        200,
        vec![],
        b"v1".to_vec(),
        ctx.headers(),
        ctx.cache(),
    );
    manager.store_entry(&key, entry).await;

    // force_refresh ignores the fresh entry and fetches v2
    let mut opts = RequestOptions::default();
    opts.cache.force_refresh = Some(true);
    let refreshed = client.send("GET", &url, opts).await.unwrap();
    assert_eq!(refreshed.text(), "v2");
    assert_eq!(refreshed.cache_status(), Some("REFRESH"));

    // The refresh replaced the stored entry
    let after = client
        .send("GET", &url, RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(after.text(), "v2");
    assert_eq!(after.cache_status(), Some("HIT"));
    server.verify().await;
}

#[tokio::test]
async fn stale_while_revalidate_serves_stale_and_refreshes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/swr"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Cache-Control", "max-age=1, stale-while-revalidate=120")
                .set_body_string("first"),
        )
        .mount(&server)
        .await;

    let client = isolated_client_with_cache(cache_config_with_ttl(60));
    let url = format!("{}/swr", server.uri());

    let first = client
        .send("GET", &url, RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(first.text(), "first");

    tokio::time::sleep(Duration::from_secs(2)).await;

    // Swap the origin's answer; the stale window must still serve "first"
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/swr"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Cache-Control", "max-age=60")
                .set_body_string("second"),
        )
        .mount(&server)
        .await;

    let stale = client
        .send("GET", &url, RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(stale.cache_status(), Some("STALE"));
    assert_eq!(stale.text(), "first");

    // Give the background revalidation task time to store the fresh copy
    tokio::time::sleep(Duration::from_millis(500)).await;

    let refreshed = client
        .send("GET", &url, RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(refreshed.cache_status(), Some("HIT"));
    assert_eq!(refreshed.text(), "second");
}

#[tokio::test]
async fn async_tasks_never_touch_the_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nocache"))
        .respond_with(ResponseTemplate::new(200).set_body_string("fresh"))
        .expect(2) // both task sends reach the origin
        .mount(&server)
        .await;

    let client = isolated_client_with_cache(cache_config_with_ttl(60));
    let url = format!("{}/nocache", server.uri());

    for _ in 0..2 {
        let response = client
            .send_task("GET", &url, RequestOptions::default())
            .join()
            .await
            .unwrap();
        assert_eq!(response.cache_status(), None);
        assert_eq!(response.text(), "fresh");
    }

    // Zero cache writes: stats show an empty store
    let stats = client.cache().unwrap().stats().await;
    assert_eq!(stats.total_entries, 0);
    server.verify().await;
}

#[tokio::test]
async fn non_cacheable_method_marked_bypass() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/p"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let client = isolated_client_with_cache(cache_config_with_ttl(60));
    let response = client
        .send("POST", &format!("{}/p", server.uri()), RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(response.cache_status(), Some("BYPASS"));
}
