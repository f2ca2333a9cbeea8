//! # REST Flows
//!
//! Requests routed to REST-only services go through the `reqwest` proxy to a
//! live upstream. Only allow-listed headers are forwarded and the upstream's
//! status and body are relayed unchanged.

use super::support::*;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn echo_headers(headers: &HeaderMap) -> Value {
    let map: Map<String, Value> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                json!(value.to_str().unwrap_or_default()),
            )
        })
        .collect();
    Value::Object(map)
}

async fn accounts_upstream() -> std::net::SocketAddr {
    let router = Router::new()
        .route(
            "/accounts",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                (
                    StatusCode::CREATED,
                    Json(json!({
                        "id": 7,
                        "owner": body["owner"],
                        "headers": echo_headers(&headers),
                    })),
                )
            }),
        )
        .route(
            "/accounts/:id",
            get(|| async { (StatusCode::NOT_FOUND, Json(json!({"error": "no such account"}))) }),
        );
    spawn_upstream(router).await
}

#[tokio::test]
async fn test_accounts_over_rest_returns_201() {
    let harness = Harness::start(Duration::from_secs(5)).await;
    let upstream = accounts_upstream().await;

    harness
        .announce(rest_service("accounts", upstream, &["POST /accounts"]))
        .await;
    harness.wait_for_route("POST", "/accounts", "accounts").await;

    let response = harness
        .client
        .post(harness.url("/accounts"))
        .header("X-Auth-Token", "t0k3n")
        .header("st-api-key", "key-1")
        .header("cookie", "session=abc")
        .header("x-forwarded-for", "10.0.0.1")
        .json(&json!({"owner": "ada"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], 7);
    assert_eq!(body["owner"], "ada");

    let forwarded = &body["headers"];
    assert_eq!(forwarded["x-auth-token"], "t0k3n");
    assert_eq!(forwarded["st-api-key"], "key-1");
    assert_eq!(forwarded["content-type"], "application/json");
    assert!(forwarded.get("cookie").is_none());
    assert!(forwarded.get("x-forwarded-for").is_none());

    let tracker = harness.gateway.tracker();
    assert_eq!(tracker.pending_count(), 0);
    assert_eq!(tracker.stats().completed_by_proxy.load(Ordering::Relaxed), 1);

    // REST-only services get no topic subscription
    assert!(!harness
        .gateway
        .sync_handler()
        .subscribed_topics()
        .contains(&"accounts".to_string()));
}

#[tokio::test]
async fn test_upstream_error_status_is_relayed() {
    let harness = Harness::start(Duration::from_secs(5)).await;
    let upstream = accounts_upstream().await;

    harness
        .announce(rest_service("accounts", upstream, &["GET /accounts/:id"]))
        .await;
    harness.wait_for_route("GET", "/accounts/42", "accounts").await;

    let response = harness
        .client
        .get(harness.url("/accounts/42"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({"error": "no such account"})
    );
}

#[tokio::test]
async fn test_unreachable_upstream_times_out() {
    let harness = Harness::start(Duration::from_millis(300)).await;

    // Reserve a port and close it so connections are refused
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    harness
        .announce(rest_service("accounts", dead, &["GET /accounts"]))
        .await;
    harness.wait_for_route("GET", "/accounts", "accounts").await;

    let response = harness.client.get(harness.url("/accounts")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 504);
    assert_eq!(harness.gateway.tracker().pending_count(), 0);
}

/// Set when the upstream handler future is dropped before finishing.
struct CancelFlag(Arc<AtomicBool>, bool);

impl Drop for CancelFlag {
    fn drop(&mut self) {
        if !self.1 {
            self.0.store(true, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn test_deadline_cancels_slow_upstream_call() {
    let harness = Harness::start(Duration::from_millis(200)).await;
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);

    let router = Router::new().route(
        "/reports",
        get(move || {
            let flag = Arc::clone(&flag);
            async move {
                let mut guard = CancelFlag(flag, false);
                tokio::time::sleep(Duration::from_secs(10)).await;
                guard.1 = true;
                Json(json!({"report": "done"}))
            }
        }),
    );
    let upstream = spawn_upstream(router).await;

    harness
        .announce(rest_service("reports", upstream, &["GET /reports"]))
        .await;
    harness.wait_for_route("GET", "/reports", "reports").await;

    let response = harness.client.get(harness.url("/reports")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 504);

    // Aborting the proxy task closes the connection; the upstream drops the handler
    assert!(eventually(|| cancelled.load(Ordering::SeqCst)).await);
}
