#![allow(missing_docs)]

//! Mesh Gateway - HTTP front door for a service mesh.
//!
//! Resolves each inbound request against a registry of services learned from
//! bus events, forwards it over the message bus or as a direct HTTP call, and
//! answers the caller exactly once: with the service's response, or with a
//! timeout when none arrives in time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           MESH GATEWAY                               │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │   HTTP ingress (axum fallback)  ─→  RequestDispatcher                │
//! │                                       │        │                     │
//! │                  ServiceRegistry  ←───┘        └──→ PendingRequest-  │
//! │                        ↑                             Tracker         │
//! │                        │                  (deadline timers, exactly- │
//! │              RegistrySyncHandler           once completion)          │
//! └────────────────────────┼───────────────────────────┼─────────────────┘
//!                          │                           │
//!          service-registry topic           service topics / REST proxy
//!                          │                           │
//!                    ┌─────┴───────────────────────────┴─────┐
//!                    │            Mesh services              │
//!                    └───────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use mesh_gateway::{Gateway, GatewayConfig, ReqwestRestProxy};
//! use shared_bus::InMemoryMessageBus;
//!
//! let bus = Arc::new(InMemoryMessageBus::new());
//! let proxy = Arc::new(ReqwestRestProxy::new(None)?);
//! let mut gateway = Gateway::new(GatewayConfig::default(), bus, proxy)?;
//! gateway.start().await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod dispatch;
pub mod domain;
pub mod ipc;
pub mod middleware;
pub mod ports;
pub mod service;

pub use adapters::{build_router, ReqwestRestProxy};
pub use dispatch::{DispatchOutcome, DispatchSettings, RequestDispatcher};
pub use domain::{
    CorrelationId, GatewayConfig, GatewayError, GatewayResponse, InboundRequest,
    PendingRequestTracker, ServiceDescriptor, ServiceRegistry,
};
pub use ipc::RegistrySyncHandler;
pub use ports::{ProxyResult, Responder, RestProxy};
pub use service::Gateway;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
