//! # Completion Orderings
//!
//! Every pending request is answered exactly once, whichever of the bus
//! response, the proxy result or the deadline gets there first.

use async_trait::async_trait;
use mesh_gateway::domain::{Channel, EndpointPattern, ProxyError};
use mesh_gateway::{
    DispatchOutcome, DispatchSettings, GatewayConfig, GatewayResponse, InboundRequest,
    PendingRequestTracker, ProxyResult, RequestDispatcher, RestProxy, ServiceDescriptor,
    ServiceRegistry,
};
use serde_json::{json, Value};
use shared_bus::{BusMessage, InMemoryMessageBus, MessageBus, ProxyResponse};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

const DEADLINE: Duration = Duration::from_millis(500);

/// Answers `200` after `delay`.
struct DelayedProxy {
    delay: Duration,
}

#[async_trait]
impl RestProxy for DelayedProxy {
    async fn send_request(
        &self,
        _method: &str,
        _url: &str,
        _body: Option<Value>,
        _headers: BTreeMap<String, String>,
    ) -> Result<Option<ProxyResult>, ProxyError> {
        tokio::time::sleep(self.delay).await;
        Ok(Some(ProxyResult {
            status_code: 200,
            body: json!({"via": "proxy"}),
        }))
    }
}

fn descriptor(name: &str, channel: Channel, endpoint: &str) -> ServiceDescriptor {
    ServiceDescriptor {
        id: name.into(),
        name: name.into(),
        supported_channels: [channel].into_iter().collect(),
        hostname: Some("127.0.0.1".into()),
        port: Some(9),
        endpoints: vec![EndpointPattern::parse(endpoint)],
        commands: vec![],
        instances: vec![],
    }
}

fn dispatcher(proxy_delay: Duration) -> RequestDispatcher {
    let mut config = GatewayConfig::default();
    config.timeouts.request = DEADLINE;

    let registry = Arc::new(ServiceRegistry::new());
    registry.update(descriptor("orders", Channel::Bus, "GET /orders"));
    registry.update(descriptor("reports", Channel::Rest, "GET /reports"));

    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryMessageBus::new());
    RequestDispatcher::new(
        registry,
        Arc::new(PendingRequestTracker::new()),
        Some(bus),
        Arc::new(DelayedProxy { delay: proxy_delay }),
        DispatchSettings::from_config(&config),
    )
}

async fn send(
    dispatcher: &RequestDispatcher,
    path: &str,
) -> (String, oneshot::Receiver<GatewayResponse>) {
    let (tx, rx) = oneshot::channel();
    let outcome = dispatcher
        .dispatch(InboundRequest::new("GET", path), Box::new(tx))
        .await;
    let DispatchOutcome::Dispatched { correlation_id, .. } = outcome else {
        panic!("expected {path} to dispatch");
    };
    (correlation_id.to_string(), rx)
}

fn bus_response(correlation_id: &str, status: u16) -> BusMessage {
    BusMessage::ProxyResponse(ProxyResponse {
        request_id: correlation_id.to_string(),
        response_code: Some(status),
        response: Some(json!({"via": "bus"})),
    })
}

#[tokio::test(start_paused = true)]
async fn test_bus_response_then_deadline() {
    let d = dispatcher(Duration::ZERO);
    let (id, rx) = send(&d, "/orders").await;

    tokio::time::sleep(DEADLINE / 2).await;
    assert!(d.handle_service_message(bus_response(&id, 200)));
    tokio::time::sleep(DEADLINE).await;

    assert_eq!(rx.await.unwrap().body, json!({"via": "bus"}));
    let stats = d.tracker().stats();
    assert_eq!(stats.completed_by_bus.load(Ordering::Relaxed), 1);
    assert_eq!(stats.total_timeouts.load(Ordering::Relaxed), 0);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_then_bus_response() {
    let d = dispatcher(Duration::ZERO);
    let (id, rx) = send(&d, "/orders").await;

    tokio::time::sleep(DEADLINE + Duration::from_millis(1)).await;
    assert_eq!(rx.await.unwrap().status, 504);
    assert!(!d.handle_service_message(bus_response(&id, 200)));

    let stats = d.tracker().stats();
    assert_eq!(stats.total_timeouts.load(Ordering::Relaxed), 1);
    assert_eq!(stats.completed_by_bus.load(Ordering::Relaxed), 0);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_bus_responses() {
    let d = dispatcher(Duration::ZERO);
    let (id, rx) = send(&d, "/orders").await;

    assert!(d.handle_service_message(bus_response(&id, 201)));
    assert!(!d.handle_service_message(bus_response(&id, 500)));

    assert_eq!(rx.await.unwrap().status, 201);
    assert_eq!(d.tracker().pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_proxy_result_then_deadline() {
    let d = dispatcher(DEADLINE / 5);
    let (_, rx) = send(&d, "/reports").await;

    let response = rx.await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!({"via": "proxy"}));

    tokio::time::sleep(DEADLINE * 2).await;
    let stats = d.tracker().stats();
    assert_eq!(stats.completed_by_proxy.load(Ordering::Relaxed), 1);
    assert_eq!(stats.total_timeouts.load(Ordering::Relaxed), 0);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_then_proxy_result() {
    let d = dispatcher(DEADLINE * 4);
    let (_, rx) = send(&d, "/reports").await;

    assert_eq!(rx.await.unwrap().status, 504);

    tokio::time::sleep(DEADLINE * 8).await;
    let stats = d.tracker().stats();
    assert_eq!(stats.total_timeouts.load(Ordering::Relaxed), 1);
    assert_eq!(stats.completed_by_proxy.load(Ordering::Relaxed), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_completions_answer_once() {
    let d = Arc::new(dispatcher(Duration::ZERO));
    let mut callers = Vec::new();

    for _ in 0..50 {
        let (id, rx) = send(&d, "/orders").await;
        // Three responders race each other
        for status in [200, 201, 202] {
            let d = Arc::clone(&d);
            let id = id.clone();
            tokio::spawn(async move {
                d.handle_service_message(bus_response(&id, status));
            });
        }
        callers.push(rx);
    }

    for rx in callers {
        let status = rx.await.unwrap().status;
        assert!([200, 201, 202].contains(&status));
    }

    let stats = d.tracker().stats();
    assert_eq!(stats.total_registered.load(Ordering::Relaxed), 50);
    assert_eq!(stats.completed_by_bus.load(Ordering::Relaxed), 50);
    assert_eq!(d.tracker().pending_count(), 0);
}
