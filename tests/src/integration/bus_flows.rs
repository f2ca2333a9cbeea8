//! # Bus Flows
//!
//! Requests routed to bus-capable services: the gateway publishes a
//! `ProxyRequest` on the service topic and answers the caller with the
//! matching `ProxyResponse`, or with `504` once the deadline passes.

use super::support::*;
use serde_json::{json, Value};
use shared_bus::{BusMessage, MessagePublisher, ProxyResponse};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn test_orders_over_bus_returns_service_response() {
    let harness = Harness::start(Duration::from_secs(5)).await;
    let orders = spawn_bus_service(&harness.bus, "orders", |_| {
        Some((Some(200), Some(json!({"orders": [1, 2, 3]}))))
    });

    harness.announce(bus_service("orders", &["GET /orders"])).await;
    harness.wait_for_route("GET", "/orders", "orders").await;
    harness.wait_for_subscription("orders").await;

    let response = harness.client.get(harness.url("/orders")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({"orders": [1, 2, 3]})
    );

    let received = orders.received.lock().clone();
    assert_eq!(received.len(), 1);
    let request = &received[0];
    assert_eq!(request.route_id, "get-/orders");
    assert!(request.correlation_id.starts_with("get-/orders."));
    assert_eq!(request.gateway_id, GATEWAY_INSTANCE);
    assert_eq!(request.method, "get");
    assert_eq!(request.endpoint, "/orders");

    let tracker = harness.gateway.tracker();
    assert_eq!(tracker.pending_count(), 0);
    assert_eq!(tracker.stats().completed_by_bus.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_request_body_travels_as_data() {
    let harness = Harness::start(Duration::from_secs(5)).await;
    let orders = spawn_bus_service(&harness.bus, "orders", |request| {
        Some((Some(201), Some(json!({"echo": request.data}))))
    });

    harness.announce(bus_service("orders", &["POST /orders"])).await;
    harness.wait_for_subscription("orders").await;

    let response = harness
        .client
        .post(harness.url("/orders"))
        .json(&json!({"sku": "A-1", "qty": 2}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 201);
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({"echo": {"sku": "A-1", "qty": 2}})
    );
    assert_eq!(orders.received.lock()[0].method, "post");
}

#[tokio::test]
async fn test_response_without_code_or_body_uses_defaults() {
    let harness = Harness::start(Duration::from_secs(5)).await;
    let _orders = spawn_bus_service(&harness.bus, "orders", |_| Some((None, None)));

    harness.announce(bus_service("orders", &["GET /orders"])).await;
    harness.wait_for_subscription("orders").await;

    let response = harness.client.get(harness.url("/orders")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(response.json::<Value>().await.unwrap(), json!({}));
}

#[tokio::test]
async fn test_orders_timeout_returns_504_and_clears_entry() {
    let harness = Harness::start(Duration::from_millis(200)).await;
    let orders = spawn_bus_service(&harness.bus, "orders", |_| None);

    harness.announce(bus_service("orders", &["GET /orders"])).await;
    harness.wait_for_subscription("orders").await;

    let response = harness.client.get(harness.url("/orders")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 504);
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({"message": "Timed out"})
    );

    let tracker = harness.gateway.tracker();
    assert_eq!(tracker.pending_count(), 0);
    assert_eq!(tracker.stats().total_timeouts.load(Ordering::Relaxed), 1);

    // A response after the deadline finds nothing to complete
    let correlation_id = orders.received.lock()[0].correlation_id.clone();
    harness
        .bus
        .publish(
            "orders",
            BusMessage::ProxyResponse(ProxyResponse {
                request_id: correlation_id.clone(),
                response_code: Some(200),
                response: Some(json!({"late": true})),
            }),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!tracker.is_pending(&correlation_id));
    assert_eq!(tracker.stats().completed_by_bus.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn test_unknown_route_is_404_without_side_effects() {
    let harness = Harness::start(Duration::from_secs(5)).await;
    let published_before = harness.bus.messages_published();

    let response = harness.client.get(harness.url("/nowhere")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 404);
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({"message": "Not found"})
    );

    assert_eq!(harness.bus.messages_published(), published_before);
    let tracker = harness.gateway.tracker();
    assert_eq!(tracker.stats().total_registered.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn test_concurrent_requests_are_correlated_independently() {
    let harness = Harness::start(Duration::from_secs(5)).await;
    // Echo the correlation id back so each caller can check it got its own answer
    let _orders = spawn_bus_service(&harness.bus, "orders", |request| {
        Some((Some(200), Some(json!({"id": request.correlation_id, "data": request.data}))))
    });

    harness.announce(bus_service("orders", &["POST /orders"])).await;
    harness.wait_for_subscription("orders").await;

    let mut calls = Vec::new();
    for n in 0..20 {
        let client = harness.client.clone();
        let url = harness.url("/orders");
        calls.push(tokio::spawn(async move {
            let response = client.post(url).json(&json!({"n": n})).send().await.unwrap();
            (n, response.json::<Value>().await.unwrap())
        }));
    }

    let mut ids = Vec::new();
    for call in calls {
        let (n, body) = call.await.unwrap();
        assert_eq!(body["data"], json!({"n": n}));
        ids.push(body["id"].as_str().unwrap().to_string());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 20);
    assert_eq!(harness.gateway.tracker().pending_count(), 0);
}
