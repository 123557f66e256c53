//! End-to-end gateway behaviour against a scripted upstream.

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::Value;

use safety_shield::store::QuotaSnapshot;

mod common;

use common::{client, closed_port, start_mock_upstream, start_shield, MockReply};

#[tokio::test]
async fn test_miss_then_hit_without_second_upstream_call() {
    let upstream = start_mock_upstream(|_, _| MockReply::ok(r#"{"a":1}"#)).await;
    let shield = start_shield(upstream.addr, |_| {}).await;
    let client = client();

    let first = client.get(shield.gateway("/ext/x?id=1")).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-cache"], "MISS");
    assert_eq!(first.text().await.unwrap(), r#"{"a":1}"#);

    let second = client.get(shield.gateway("/ext/x?id=1")).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(second.text().await.unwrap(), r#"{"a":1}"#);

    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn test_query_order_shares_a_cache_entry() {
    let upstream = start_mock_upstream(|_, _| MockReply::ok("{}")).await;
    let shield = start_shield(upstream.addr, |_| {}).await;
    let client = client();

    let a = client.get(shield.gateway("/ext/x?a=1&b=2")).send().await.unwrap();
    assert_eq!(a.headers()["x-cache"], "MISS");
    let b = client.get(shield.gateway("/ext/x?b=2&a=1")).send().await.unwrap();
    assert_eq!(b.headers()["x-cache"], "HIT");
    let c = client.get(shield.gateway("/ext/x?b=3&a=1")).send().await.unwrap();
    assert_eq!(c.headers()["x-cache"], "MISS");

    assert_eq!(upstream.calls(), 2);
}

#[tokio::test]
async fn test_block_marker_halts_every_caller() {
    let upstream = start_mock_upstream(|_, _| {
        MockReply::status(403, r#"{"error":"blocked"}"#).header("X-Blocked", "true")
    })
    .await;
    let shield = start_shield(upstream.addr, |_| {}).await;
    let client = client();

    let first = client.get(shield.gateway("/ext/x?id=1")).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = first.json().await.unwrap();
    assert_eq!(body["error"], "SYSTEM_HALTED");

    tokio::time::sleep(Duration::from_millis(10)).await;

    let second = client
        .get(shield.gateway("/ext/other?id=2"))
        .header("Authorization", "Bearer someone-else")
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(second.headers().contains_key("retry-after"));
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["error"], "SYSTEM_HALTED");
    assert!(body["retryAfter"].as_u64().unwrap() > 0);

    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn test_writes_are_forbidden_without_side_effects() {
    let upstream = start_mock_upstream(|_, _| MockReply::ok("{}")).await;
    let shield = start_shield(upstream.addr, |_| {}).await;
    let client = client();

    for method in [
        reqwest::Method::POST,
        reqwest::Method::PUT,
        reqwest::Method::DELETE,
        reqwest::Method::PATCH,
    ] {
        let res = client
            .request(method, shield.gateway("/ext/x"))
            .header("Authorization", format!("Bearer {}", common::ADMIN_KEY))
            .body("{}")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "METHOD_NOT_ALLOWED");
    }

    // Even while halted, a write is a policy violation first.
    shield
        .state
        .breaker
        .trip_hard_lock(Duration::from_secs(60), "test")
        .await
        .unwrap();
    let res = client.post(shield.gateway("/ext/x")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn test_exhausted_quota_cools_everyone_down() {
    let upstream = start_mock_upstream(|_, _| MockReply::ok("{}")).await;
    let shield = start_shield(upstream.addr, |_| {}).await;
    let client = client();

    shield
        .state
        .store
        .write_quota(&QuotaSnapshot::new(0, 100, 0))
        .await
        .unwrap();

    let first = client.get(shield.gateway("/ext/x")).send().await.unwrap();
    let second = client.get(shield.gateway("/ext/y")).send().await.unwrap();

    assert_eq!(first.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let first: Value = first.json().await.unwrap();
    let second: Value = second.json().await.unwrap();
    assert_eq!(first["error"], "RATE_LIMITED");
    assert_eq!(second["error"], "RATE_LIMITED");
    assert_eq!(first["retryAfter"], second["retryAfter"]);

    assert!(shield.state.breaker.is_soft_locked().await);
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn test_zero_remaining_header_trips_cooldown_after_success() {
    let upstream = start_mock_upstream(|_, _| {
        MockReply::ok(r#"{"last":true}"#)
            .header("X-RateLimit-Remaining", "0")
            .header("X-RateLimit-Limit", "1000")
    })
    .await;
    let shield = start_shield(upstream.addr, |_| {}).await;
    let client = client();

    let first = client.get(shield.gateway("/ext/x")).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-ratelimit-remaining"], "0");
    assert_eq!(first.headers()["x-ratelimit-limit"], "1000");

    let second = client.get(shield.gateway("/ext/y")).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn test_upstream_429_mirrors_and_cools_down() {
    let upstream = start_mock_upstream(|_, _| MockReply::status(429, r#"{"error":"slow down"}"#)).await;
    let shield = start_shield(upstream.addr, |_| {}).await;
    let client = client();

    let first = client.get(shield.gateway("/ext/x")).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::TOO_MANY_REQUESTS);
    let second = client.get(shield.gateway("/ext/x")).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn test_halt_precedes_cache() {
    let upstream = start_mock_upstream(|_, _| MockReply::ok(r#"{"a":1}"#)).await;
    let shield = start_shield(upstream.addr, |_| {}).await;
    let client = client();

    let warm = client.get(shield.gateway("/ext/x")).send().await.unwrap();
    assert_eq!(warm.headers()["x-cache"], "MISS");

    shield
        .state
        .breaker
        .trip_hard_lock(Duration::from_secs(120), "test")
        .await
        .unwrap();

    for _ in 0..3 {
        let res = client.get(shield.gateway("/ext/x")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(res.headers().get("x-cache").is_none());
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "SYSTEM_HALTED");
        let hint = body["retryAfter"].as_u64().unwrap();
        assert!(hint > 0 && hint <= 120);
    }
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn test_errors_are_never_cached() {
    let upstream = start_mock_upstream(|_, _| MockReply::status(500, r#"{"error":"boom"}"#)).await;
    let shield = start_shield(upstream.addr, |_| {}).await;
    let client = client();

    for _ in 0..2 {
        let res = client.get(shield.gateway("/ext/x?id=1")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "API_ERROR");
        assert_eq!(body["details"], r#"{"error":"boom"}"#);
    }
    assert_eq!(upstream.calls(), 2);
}

#[tokio::test]
async fn test_concurrency_bound_holds_under_load() {
    let upstream = start_mock_upstream(|_, _| MockReply::ok("{}").delay(Duration::from_millis(100))).await;
    let shield = start_shield(upstream.addr, |c| c.scheduler.max_concurrent = 2).await;
    let client = client();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let client = client.clone();
        let url = shield.gateway(&format!("/ext/x?id={}", i));
        tasks.push(tokio::spawn(async move { client.get(url).send().await.unwrap().status() }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(upstream.calls(), 8);
    assert!(upstream.peak() <= 2, "peak in-flight was {}", upstream.peak());
}

#[tokio::test]
async fn test_store_outage_fails_closed() {
    let upstream = start_mock_upstream(|_, _| MockReply::ok("{}")).await;
    let shield = start_shield(upstream.addr, |_| {}).await;
    shield.kv.set_offline(true);

    let res = client().get(shield.gateway("/ext/x")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.headers()["retry-after"], "5");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "STORE_UNAVAILABLE");
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let upstream = start_mock_upstream(|_, _| MockReply::ok("{}").delay(Duration::from_secs(3))).await;
    let shield = start_shield(upstream.addr, |c| c.upstream.timeout_secs = 1).await;

    let res = client().get(shield.gateway("/ext/x")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "UPSTREAM_TIMEOUT");
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let shield = start_shield(closed_port().await, |_| {}).await;

    let res = client().get(shield.gateway("/ext/x")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "UPSTREAM_UNAVAILABLE");
}

#[tokio::test]
async fn test_missing_token_is_configuration_error() {
    let upstream = start_mock_upstream(|_, _| MockReply::ok("{}")).await;
    let shield = start_shield(upstream.addr, |c| c.upstream.token = None).await;

    let res = client().get(shield.gateway("/ext/x")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "CONFIGURATION_ERROR");
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn test_caller_keys_gate_the_gateway() {
    let upstream = start_mock_upstream(|_, _| MockReply::ok("{}")).await;
    let shield = start_shield(upstream.addr, |c| c.auth.caller_keys = vec!["leader".into()]).await;
    let client = client();

    let anonymous = client.get(shield.gateway("/ext/x")).send().await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let leader = client
        .get(shield.gateway("/ext/x"))
        .header("Authorization", "Bearer leader")
        .send()
        .await
        .unwrap();
    assert_eq!(leader.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_forwards_path_and_query() {
    let upstream = start_mock_upstream(|_, line| {
        assert!(line.starts_with("GET /ext/members/contact/?action=getListOfMembers&sectionid=7 "), "{}", line);
        MockReply::ok("{}")
    })
    .await;
    let shield = start_shield(upstream.addr, |_| {}).await;

    let res = client()
        .get(shield.gateway("/ext/members/contact/?action=getListOfMembers&sectionid=7"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
}
