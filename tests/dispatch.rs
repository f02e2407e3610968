//! Dispatch pipeline integration tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;

mod common;
use common::*;

#[tokio::test]
async fn routed_request_reaches_backend() {
    let backend = start_mock_backend("hello from backend").await;
    let (proxy, _state, _shutdown) =
        start_proxy(proxy_config("least_connections", &[TestBackend::new("b1", backend)])).await;

    let res = test_client()
        .get(format!("http://{}/anything", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "hello from backend");
}

#[tokio::test]
async fn unmatched_path_returns_404() {
    let backend = start_mock_backend("ok").await;
    let mut config = proxy_config("least_connections", &[TestBackend::new("b1", backend)]);

    // Rename the rule away from "default" and narrow its prefix so /other
    // has nowhere to go.
    let mut rule = config.routing.remove("default").unwrap();
    rule.path = "/api".to_string();
    config.routing.insert("api".to_string(), rule);

    let (proxy, _state, _shutdown) = start_proxy(config).await;
    let client = test_client();

    let hit = client
        .get(format!("http://{}/api/users", proxy))
        .send()
        .await
        .unwrap();
    assert_eq!(hit.status(), StatusCode::OK);

    let miss = client
        .get(format!("http://{}/other", proxy))
        .send()
        .await
        .unwrap();
    assert_eq!(miss.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn connection_limit_rejects_excess_requests() {
    let backend = start_programmable_backend(|| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        (200, "slow".to_string())
    })
    .await;

    let (proxy, _state, _shutdown) = start_proxy(proxy_config(
        "least_connections",
        &[TestBackend::new("b1", backend).max_conn(2)],
    ))
    .await;

    let client = test_client();
    let url = format!("http://{}/", proxy);

    let first = tokio::spawn({
        let client = client.clone();
        let url = url.clone();
        async move { client.get(&url).send().await }
    });
    let second = tokio::spawn({
        let client = client.clone();
        let url = url.clone();
        async move { client.get(&url).send().await }
    });

    tokio::time::sleep(Duration::from_millis(150)).await;

    let third = client.get(&url).send().await.unwrap();
    assert_eq!(third.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        third.text().await.unwrap(),
        "Service Unavailable (All backends at connection limit)"
    );

    assert_eq!(first.await.unwrap().unwrap().status(), StatusCode::OK);
    assert_eq!(second.await.unwrap().unwrap().status(), StatusCode::OK);

    // With the long-lived requests done, capacity is back.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let fourth = client.get(&url).send().await.unwrap();
    assert_eq!(fourth.status(), StatusCode::OK);
}

#[tokio::test]
async fn forwarded_header_chain_reaches_backend() {
    let backend =
        start_header_echo_backend(&["x-forwarded-for", "x-real-ip", "x-forwarded-proto"]).await;
    let (proxy, _state, _shutdown) =
        start_proxy(proxy_config("least_connections", &[TestBackend::new("b1", backend)])).await;

    // The test client connects from 127.0.0.1, which the config trusts.
    let res = test_client()
        .get(format!("http://{}/", proxy))
        .header("X-Forwarded-For", "198.51.100.2")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = res.text().await.unwrap();
    assert!(
        body.contains("x-forwarded-for: 198.51.100.2, 198.51.100.2"),
        "unexpected chain: {}",
        body
    );
    assert!(body.contains("x-real-ip: 198.51.100.2"), "body: {}", body);
    assert!(body.contains("x-forwarded-proto: http"), "body: {}", body);
}

#[tokio::test]
async fn untrusted_peer_cannot_spoof_forwarded_for() {
    let backend = start_header_echo_backend(&["x-real-ip"]).await;
    let mut config = proxy_config("least_connections", &[TestBackend::new("b1", backend)]);
    config.server.trusted_proxies = vec!["203.0.113.0/24".to_string()];

    let (proxy, _state, _shutdown) = start_proxy(config).await;

    let res = test_client()
        .get(format!("http://{}/", proxy))
        .header("X-Forwarded-For", "198.51.100.2")
        .send()
        .await
        .unwrap();

    // The peer (127.0.0.1) is not a trusted proxy, so the client IP is
    // the peer itself.
    let body = res.text().await.unwrap();
    assert!(body.contains("x-real-ip: 127.0.0.1"), "body: {}", body);
}

#[tokio::test]
async fn idempotent_requests_retry_exactly_once() {
    let hits = Arc::new(AtomicU32::new(0));
    let backend = start_slamming_backend(hits.clone()).await;
    let (proxy, _state, _shutdown) =
        start_proxy(proxy_config("least_connections", &[TestBackend::new("b1", backend)])).await;
    let client = test_client();

    let res = client
        .get(format!("http://{}/", proxy))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(hits.load(Ordering::SeqCst), 2, "GET should retry once");

    hits.store(0, Ordering::SeqCst);
    let res = client
        .post(format!("http://{}/", proxy))
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(hits.load(Ordering::SeqCst), 1, "POST must not retry");
}

#[tokio::test]
async fn accounting_balances_after_failures() {
    let hits = Arc::new(AtomicU32::new(0));
    let backend = start_slamming_backend(hits.clone()).await;
    let (proxy, state, _shutdown) =
        start_proxy(proxy_config("least_connections", &[TestBackend::new("b1", backend)])).await;
    let client = test_client();

    for _ in 0..5 {
        let _ = client.get(format!("http://{}/", proxy)).send().await;
    }

    let snapshot = state.inner.load();
    let upstream = snapshot.registry.get("web").unwrap();
    assert_eq!(upstream.backends()[0].get_connections(), 0);
}
