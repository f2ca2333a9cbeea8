//! Gateway composition root.
//!
//! Wires the registry, the pending tracker, the dispatcher and the registry
//! sync handler to a bus, a REST proxy and the HTTP ingress.

use crate::adapters::build_router;
use crate::dispatch::{DispatchSettings, RequestDispatcher};
use crate::domain::config::GatewayConfig;
use crate::domain::error::GatewayError;
use crate::domain::pending::PendingRequestTracker;
use crate::domain::registry::ServiceRegistry;
use crate::ipc::RegistrySyncHandler;
use crate::ports::RestProxy;
use axum::Router;
use shared_bus::{
    BusMessage, CommunicationChannel, MessageBus, MessagePublisher, MessageSubscriber,
    ServiceAnnouncement,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Running HTTP server.
struct HttpServer {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// The API gateway.
pub struct Gateway {
    config: GatewayConfig,
    bus: Arc<dyn MessageBus>,
    registry: Arc<ServiceRegistry>,
    tracker: Arc<PendingRequestTracker>,
    dispatcher: Arc<RequestDispatcher>,
    sync_handler: Arc<RegistrySyncHandler>,
    sync_task: Option<JoinHandle<()>>,
    server: Option<HttpServer>,
    local_addr: Option<SocketAddr>,
    started: bool,
}

impl Gateway {
    /// Validate `config` and build every component. Nothing runs until
    /// [`Gateway::start`].
    pub fn new(
        config: GatewayConfig,
        bus: Arc<dyn MessageBus>,
        proxy: Arc<dyn RestProxy>,
    ) -> Result<Self, GatewayError> {
        config.validate()?;

        let registry = Arc::new(ServiceRegistry::new());
        let tracker = Arc::new(PendingRequestTracker::new());

        // Rest-only mode never publishes
        let dispatch_bus = config.bus.enabled.then(|| Arc::clone(&bus));
        let dispatcher = Arc::new(RequestDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&tracker),
            dispatch_bus,
            proxy,
            DispatchSettings::from_config(&config),
        ));

        let sync_handler = Arc::new(RegistrySyncHandler::new(
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            Arc::clone(&bus),
            config.identity.service_id.clone(),
        ));

        Ok(Self {
            config,
            bus,
            registry,
            tracker,
            dispatcher,
            sync_handler,
            sync_task: None,
            server: None,
            local_addr: None,
            started: false,
        })
    }

    /// Join the mesh and open the ingress.
    ///
    /// With the bus enabled: subscribe to the registry topic, announce this
    /// gateway online and ask for the current service list. With HTTP
    /// enabled: bind and serve until [`Gateway::shutdown`].
    pub async fn start(&mut self) -> Result<(), GatewayError> {
        if self.started {
            return Err(GatewayError::AlreadyStarted);
        }
        info!(
            service = %self.config.identity.service_id,
            instance = %self.config.identity.instance_id,
            "Starting gateway..."
        );

        if self.config.bus.enabled {
            if let Err(e) = self.join_mesh().await {
                self.stop_sync();
                return Err(e);
            }
        } else {
            warn!("Message bus disabled; only REST services are reachable");
        }

        if self.config.http.enabled {
            if let Err(e) = self.serve_http().await {
                self.stop_sync();
                return Err(e);
            }
        }

        self.started = true;
        info!("Gateway started");
        Ok(())
    }

    /// Leave the mesh and stop serving.
    ///
    /// Requests still pending are answered by their deadlines.
    pub async fn shutdown(&mut self) {
        if !self.started {
            return;
        }
        info!("Stopping gateway...");

        if self.config.bus.enabled {
            let offline = BusMessage::ServiceOffline {
                instance_id: self.config.identity.instance_id.clone(),
                service_id: self.config.identity.service_id.clone(),
            };
            if let Err(e) = self.bus.publish(&self.config.bus.registry_topic, offline).await {
                warn!(error = %e, "Failed to announce offline");
            }
        }

        if let Some(server) = self.server.take() {
            let _ = server.shutdown_tx.send(());
            if let Err(e) = server.task.await {
                error!(error = %e, "HTTP server task failed");
            }
        }

        self.stop_sync();
        info!("Gateway stopped");
    }

    /// Address the ingress is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<ServiceRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn tracker(&self) -> Arc<PendingRequestTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn dispatcher(&self) -> Arc<RequestDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn sync_handler(&self) -> Arc<RegistrySyncHandler> {
        Arc::clone(&self.sync_handler)
    }

    /// The ingress router, for serving elsewhere or driving in tests.
    pub fn router(&self) -> Router {
        build_router(Arc::clone(&self.dispatcher), &self.config.cors)
    }

    fn stop_sync(&mut self) {
        if let Some(task) = self.sync_task.take() {
            task.abort();
        }
        self.sync_handler.shutdown();
    }

    async fn join_mesh(&mut self) -> Result<(), GatewayError> {
        let topic = self.config.bus.registry_topic.clone();
        let subscription = self.bus.subscribe(&topic)?;
        self.sync_task = Some(tokio::spawn(
            Arc::clone(&self.sync_handler).run(subscription),
        ));

        let identity = &self.config.identity;
        let online = BusMessage::ServiceOnline(ServiceAnnouncement {
            instance_id: identity.instance_id.clone(),
            service_id: identity.service_id.clone(),
            supported_channels: vec![CommunicationChannel::Bus],
            hostname: Some(identity.hostname.clone()),
            port: Some(self.config.http.port),
            endpoints: vec![],
            commands: vec![],
            instances: None,
        });
        self.bus.publish(&topic, online).await?;
        self.bus.publish(&topic, BusMessage::ServiceListQuery).await?;

        info!(topic = %topic, "Joined service mesh");
        Ok(())
    }

    async fn serve_http(&mut self) -> Result<(), GatewayError> {
        let addr = self.config.http_addr();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(GatewayError::Bind)?;
        let local_addr = listener.local_addr().map_err(GatewayError::Bind)?;
        info!(addr = %local_addr, "Starting HTTP server");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let router = self.router();
        let task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %e, "HTTP server error");
            }
        });

        self.local_addr = Some(local_addr);
        self.server = Some(HttpServer { shutdown_tx, task });
        Ok(())
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        if let Some(task) = self.sync_task.take() {
            task.abort();
        }
        if let Some(server) = self.server.take() {
            let _ = server.shutdown_tx.send(());
        }
    }
}
