//! Test harness: a running gateway on loopback, scripted bus services and
//! live HTTP upstreams.

use axum::Router;
use mesh_gateway::{Gateway, GatewayConfig, ReqwestRestProxy};
use parking_lot::Mutex;
use shared_bus::{
    BusMessage, CommunicationChannel, EndpointSpec, InMemoryMessageBus, MessageBus,
    MessagePublisher, MessageSubscriber, ProxyRequest, ProxyResponse, ServiceAnnouncement,
    SERVICE_REGISTRY_TOPIC,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const GATEWAY_INSTANCE: &str = "gw-test";

/// A started gateway plus the bus it is attached to.
pub struct Harness {
    pub bus: Arc<InMemoryMessageBus>,
    pub gateway: Gateway,
    pub base_url: String,
    pub client: reqwest::Client,
}

impl Harness {
    /// Start a gateway on `127.0.0.1:0` with the given request timeout.
    pub async fn start(request_timeout: Duration) -> Self {
        Self::start_with(config(request_timeout)).await
    }

    pub async fn start_with(config: GatewayConfig) -> Self {
        let bus = Arc::new(InMemoryMessageBus::new());
        let proxy = Arc::new(ReqwestRestProxy::new(None).unwrap());
        let mut gateway =
            Gateway::new(config, Arc::clone(&bus) as Arc<dyn MessageBus>, proxy).unwrap();
        gateway.start().await.unwrap();

        let base_url = format!("http://{}", gateway.local_addr().unwrap());
        Self {
            bus,
            gateway,
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Publish on the registry topic.
    pub async fn registry_event(&self, message: BusMessage) {
        self.bus
            .publish(SERVICE_REGISTRY_TOPIC, message)
            .await
            .unwrap();
    }

    pub async fn announce(&self, announcement: ServiceAnnouncement) {
        self.registry_event(BusMessage::ServiceOnline(announcement))
            .await;
    }

    /// Wait until `method path` resolves to `service`.
    pub async fn wait_for_route(&self, method: &str, path: &str, service: &str) {
        let registry = self.gateway.registry();
        let routed = eventually(|| {
            registry
                .resolve(method, path)
                .is_some_and(|s| s.id == service)
        })
        .await;
        assert!(routed, "{method} {path} never routed to {service}");
    }

    pub async fn wait_for_subscription(&self, topic: &str) {
        let sync = self.gateway.sync_handler();
        let subscribed = eventually(|| sync.subscribed_topics().iter().any(|t| t == topic)).await;
        assert!(subscribed, "gateway never subscribed to {topic}");
    }
}

pub fn config(request_timeout: Duration) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.http.host = [127, 0, 0, 1].into();
    config.http.port = 0;
    config.identity.instance_id = GATEWAY_INSTANCE.to_string();
    config.timeouts.request = request_timeout;
    config
}

/// Announcement for a bus-only service.
pub fn bus_service(name: &str, endpoints: &[&str]) -> ServiceAnnouncement {
    announcement(name, vec![CommunicationChannel::Bus], None, endpoints)
}

/// Announcement for a REST-only service listening on `addr`.
pub fn rest_service(name: &str, addr: SocketAddr, endpoints: &[&str]) -> ServiceAnnouncement {
    announcement(name, vec![CommunicationChannel::Rest], Some(addr), endpoints)
}

fn announcement(
    name: &str,
    channels: Vec<CommunicationChannel>,
    addr: Option<SocketAddr>,
    endpoints: &[&str],
) -> ServiceAnnouncement {
    ServiceAnnouncement {
        instance_id: format!("{name}-1"),
        service_id: name.to_string(),
        supported_channels: channels,
        hostname: addr.map(|a| a.ip().to_string()),
        port: addr.map(|a| a.port()),
        endpoints: endpoints
            .iter()
            .map(|e| EndpointSpec::Path(e.to_string()))
            .collect(),
        commands: vec![],
        instances: None,
    }
}

/// A mesh service answering gateway requests on its topic.
pub struct FakeService {
    pub received: Arc<Mutex<Vec<ProxyRequest>>>,
    task: JoinHandle<()>,
}

impl Drop for FakeService {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Subscribe to `topic` and answer every `ProxyRequest` with `reply`.
///
/// `reply` returning `None` leaves the request unanswered.
pub fn spawn_bus_service<F>(bus: &Arc<InMemoryMessageBus>, topic: &str, reply: F) -> FakeService
where
    F: Fn(&ProxyRequest) -> Option<(Option<u16>, Option<serde_json::Value>)> + Send + 'static,
{
    let mut subscription = bus.subscribe(topic).unwrap();
    let publisher = Arc::clone(bus);
    let topic = topic.to_string();
    let received = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&received);

    let task = tokio::spawn(async move {
        while let Some(message) = subscription.recv().await {
            let BusMessage::ProxyRequest(request) = message else {
                continue;
            };
            log.lock().push(request.clone());

            if let Some((response_code, response)) = reply(&request) {
                let answer = BusMessage::ProxyResponse(ProxyResponse {
                    request_id: request.correlation_id.clone(),
                    response_code,
                    response,
                });
                let _ = publisher.publish(&topic, answer).await;
            }
        }
    });

    FakeService { received, task }
}

/// Serve `router` on an ephemeral loopback port.
pub async fn spawn_upstream(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Poll `condition` for up to two seconds.
pub async fn eventually<F>(condition: F) -> bool
where
    F: Fn() -> bool,
{
    within(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}

/// Whether `future` finishes within `limit`.
pub async fn within<F: Future<Output = ()>>(limit: Duration, future: F) -> bool {
    tokio::time::timeout(limit, future).await.is_ok()
}
