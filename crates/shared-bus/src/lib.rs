//! # Shared Bus - Message Bus for the Service Mesh
//!
//! Topic-keyed publish/subscribe transport used by the gateway and the mesh
//! services it fronts.
//!
//! ## Topics
//!
//! ```text
//! ┌──────────────┐   SERVICE_ONLINE / SERVICE_OFFLINE   ┌──────────────────┐
//! │   Service    │ ───────────────────────────────────→ │ service-registry │
//! └──────────────┘                                      └──────────────────┘
//!        ↑  ↓                                                    │
//!   REQUEST  RESPONSE            (topic = service name)          ↓
//!        │  │                                             ┌──────────────┐
//!        └──┴──────────────────────────────────────────── │   Gateway    │
//!                                                         └──────────────┘
//! ```
//!
//! Every topic is an independent ordered stream. Subscribers only see
//! messages published after they subscribed.
//!
//! ## Messages
//!
//! Wire messages are duck-typed JSON objects distinguished by their
//! `messageType`, `eventId` and `queryId` fields. [`BusMessage`] is the closed
//! set of shapes the mesh understands; [`wire`] decodes them once at the
//! transport boundary.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod messages;
pub mod publisher;
pub mod subscriber;
pub mod wire;

// Re-export main types
pub use messages::{
    BusMessage, CommunicationChannel, EndpointSpec, ProxyRequest, ProxyResponse,
    ServiceAnnouncement, ServiceEntry,
};
pub use publisher::{BusError, InMemoryMessageBus, MessageBus, MessagePublisher};
pub use subscriber::{MessageSubscriber, Subscription};
pub use wire::DecodeError;

/// Maximum messages to buffer per topic before slow subscribers lag.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Well-known topic carrying service registry events and queries.
pub const SERVICE_REGISTRY_TOPIC: &str = "service-registry";
