//! Request Dispatcher - routes each inbound request and reconciles its completion.
//!
//! ```text
//! RESOLVING ──no route──→ NO_ROUTE (404 or fallthrough)
//!     │
//!     └──→ DISPATCHED ──→ COMPLETED_BY_BUS | COMPLETED_BY_PROXY | COMPLETED_BY_TIMEOUT
//! ```
//!
//! The pending entry and its deadline are always registered before the
//! request leaves the gateway, so a response arriving immediately finds it.

use crate::dispatch::headers::forwarded_headers;
use crate::domain::config::{GatewayConfig, UnmatchedRoute};
use crate::domain::correlation::CorrelationId;
use crate::domain::error::DispatchError;
use crate::domain::pending::{PendingRequest, PendingRequestTracker};
use crate::domain::registry::ServiceRegistry;
use crate::domain::route::RouteKey;
use crate::domain::types::{Channel, CompletionSource, GatewayResponse, InboundRequest, ServiceDescriptor};
use crate::ports::{Responder, RestProxy};
use serde_json::{json, Value};
use shared_bus::{BusMessage, MessageBus, MessagePublisher, ProxyRequest};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Dispatcher knobs derived from [`GatewayConfig`].
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Sent as `gatewayId` on bus requests
    pub gateway_id: String,
    /// Deadline for every dispatched request
    pub request_timeout: Duration,
    pub unmatched: UnmatchedRoute,
    /// Header allow-list for REST forwarding
    pub forwarded_headers: Vec<String>,
}

impl DispatchSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            gateway_id: config.identity.instance_id.clone(),
            request_timeout: config.timeouts.request,
            unmatched: config.routing.unmatched,
            forwarded_headers: config.routing.forwarded_headers.clone(),
        }
    }
}

/// What happened to an inbound request.
pub enum DispatchOutcome {
    /// Registered and sent; the caller is answered asynchronously.
    Dispatched {
        correlation_id: CorrelationId,
        channel: Channel,
    },
    /// No route; `404` written.
    NotFound,
    /// No route; the ingress keeps the responder.
    Fallthrough(Box<dyn Responder>),
    /// Internal error; `500` written or the caller dropped.
    Failed,
}

/// Routes inbound requests to services and reconciles their completions.
pub struct RequestDispatcher {
    registry: Arc<ServiceRegistry>,
    tracker: Arc<PendingRequestTracker>,
    /// `None` when the bus is disabled
    bus: Option<Arc<dyn MessageBus>>,
    proxy: Arc<dyn RestProxy>,
    settings: DispatchSettings,
}

impl RequestDispatcher {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        tracker: Arc<PendingRequestTracker>,
        bus: Option<Arc<dyn MessageBus>>,
        proxy: Arc<dyn RestProxy>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            registry,
            tracker,
            bus,
            proxy,
            settings,
        }
    }

    /// Route one inbound request.
    pub async fn dispatch(
        &self,
        request: InboundRequest,
        responder: Box<dyn Responder>,
    ) -> DispatchOutcome {
        let route_key = RouteKey::new(&request.method, &request.path);
        let correlation_id = CorrelationId::generate(&route_key);

        let Some(service) = self.registry.resolve(&request.method, &request.path) else {
            return self.unmatched(&route_key, responder);
        };

        let channel = match self.select_channel(&service) {
            Ok(channel) => channel,
            Err(e) => {
                error!(route = %route_key, service = %service.id, error = %e, "Cannot dispatch");
                responder.respond(GatewayResponse::internal_error());
                return DispatchOutcome::Failed;
            }
        };

        let pending = PendingRequest::new(route_key.clone(), channel, &service.name, responder);
        if !self.tracker.add(correlation_id.clone(), pending) {
            // The responder was dropped with the refused entry; the ingress answers 500
            error!(
                correlation_id = %correlation_id,
                error = %DispatchError::DuplicateCorrelationId(correlation_id.to_string()),
                "Cannot dispatch"
            );
            return DispatchOutcome::Failed;
        }
        self.tracker
            .schedule_deadline(&correlation_id, self.settings.request_timeout);

        debug!(
            correlation_id = %correlation_id,
            route = %route_key,
            service = %service.name,
            channel = %channel,
            "Dispatching request"
        );

        let sent = match channel {
            Channel::Bus => self.send_over_bus(&service, &route_key, &correlation_id, request).await,
            Channel::Rest => self.send_over_rest(&service, &correlation_id, request),
        };

        match sent {
            Ok(()) => {}
            Err(e) if e.is_deferred_to_deadline() => {
                warn!(correlation_id = %correlation_id, error = %e, "Dispatch failed; awaiting deadline");
            }
            Err(e) => {
                error!(correlation_id = %correlation_id, error = %e, "Dispatch failed");
                self.tracker.complete(
                    correlation_id.as_str(),
                    GatewayResponse::internal_error(),
                    CompletionSource::Failure,
                );
                return DispatchOutcome::Failed;
            }
        }

        DispatchOutcome::Dispatched {
            correlation_id,
            channel,
        }
    }

    /// Reconcile a message delivered on a service topic.
    ///
    /// Only `ProxyResponse` completes anything; unknown or already completed
    /// correlation ids are ignored. Returns `true` if a caller was answered.
    pub fn handle_service_message(&self, message: BusMessage) -> bool {
        let kind = message.kind();
        let BusMessage::ProxyResponse(response) = message else {
            debug!(kind, "Ignoring non-response message on service topic");
            return false;
        };

        // A zero code counts as missing
        let status = response.response_code.filter(|code| *code != 0).unwrap_or(400);
        let body = response.response.unwrap_or_else(|| json!({}));

        self.tracker.complete(
            &response.request_id,
            GatewayResponse::new(status, body),
            CompletionSource::Bus,
        )
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<PendingRequestTracker> {
        &self.tracker
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    fn unmatched(&self, route_key: &RouteKey, responder: Box<dyn Responder>) -> DispatchOutcome {
        match self.settings.unmatched {
            UnmatchedRoute::NotFound => {
                debug!(route = %route_key, "No service for route");
                responder.respond(GatewayResponse::not_found());
                DispatchOutcome::NotFound
            }
            UnmatchedRoute::Fallthrough => {
                debug!(route = %route_key, "No service for route; falling through");
                DispatchOutcome::Fallthrough(responder)
            }
        }
    }

    /// Bus when the service supports it and the bus is enabled, else REST.
    fn select_channel(&self, service: &ServiceDescriptor) -> Result<Channel, DispatchError> {
        if self.bus.is_some() && service.supports(Channel::Bus) {
            return Ok(Channel::Bus);
        }

        if service.supports(Channel::Rest) {
            return match service.rest_base_url() {
                Some(_) => Ok(Channel::Rest),
                None => Err(DispatchError::NoRestAddress {
                    service: service.id.clone(),
                }),
            };
        }

        Err(DispatchError::NoChannel {
            service: service.id.clone(),
        })
    }

    async fn send_over_bus(
        &self,
        service: &ServiceDescriptor,
        route_key: &RouteKey,
        correlation_id: &CorrelationId,
        request: InboundRequest,
    ) -> Result<(), DispatchError> {
        let Some(bus) = &self.bus else {
            return Err(DispatchError::NoChannel {
                service: service.id.clone(),
            });
        };

        let message = BusMessage::ProxyRequest(ProxyRequest {
            route_id: route_key.to_string(),
            correlation_id: correlation_id.to_string(),
            gateway_id: self.settings.gateway_id.clone(),
            method: request.method.to_ascii_lowercase(),
            endpoint: request.path,
            data: request.body.unwrap_or(Value::Null),
        });

        let receivers = bus
            .publish(&service.name, message)
            .await
            .map_err(|source| DispatchError::Publish {
                topic: service.name.clone(),
                source,
            })?;

        if receivers == 0 {
            warn!(
                correlation_id = %correlation_id,
                service = %service.name,
                "No subscribers on service topic"
            );
        }
        Ok(())
    }

    /// Spawn the proxy call; its abort handle lives in the pending entry so a
    /// winning timeout cancels the upstream request.
    fn send_over_rest(
        &self,
        service: &ServiceDescriptor,
        correlation_id: &CorrelationId,
        request: InboundRequest,
    ) -> Result<(), DispatchError> {
        let base = service
            .rest_base_url()
            .ok_or_else(|| DispatchError::NoRestAddress {
                service: service.id.clone(),
            })?;

        let url = format!("{}{}", base, request.path);
        let method = request.method.to_ascii_uppercase();
        let headers = forwarded_headers(&request.headers, &self.settings.forwarded_headers);
        let body = request.body;

        let proxy = Arc::clone(&self.proxy);
        let tracker = Arc::clone(&self.tracker);
        let id = correlation_id.clone();

        let call = tokio::spawn(async move {
            match proxy.send_request(&method, &url, body, headers).await {
                Ok(Some(result)) => {
                    tracker.complete(
                        id.as_str(),
                        GatewayResponse::new(result.status_code, result.body),
                        CompletionSource::Proxy,
                    );
                }
                Ok(None) => {
                    tracker.complete(
                        id.as_str(),
                        GatewayResponse::not_found(),
                        CompletionSource::Proxy,
                    );
                }
                Err(e) => {
                    warn!(correlation_id = %id, url = %url, error = %e, "Proxy call failed; awaiting deadline");
                }
            }
        });

        self.tracker
            .attach_outbound(correlation_id.as_str(), call.abort_handle());
        Ok(())
    }
}
