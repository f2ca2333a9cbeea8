//! Domain types for the gateway.
//!
//! Configuration, errors, correlation, and the two shared structures the
//! dispatcher is built on: the service registry and the pending tracker.

pub mod config;
pub mod correlation;
pub mod error;
pub mod pending;
pub mod registry;
pub mod route;
pub mod types;

// Re-exports for convenience
pub use config::{GatewayConfig, UnmatchedRoute};
pub use correlation::CorrelationId;
pub use error::{DispatchError, GatewayError, ProxyError};
pub use pending::{PendingInfo, PendingRequest, PendingRequestTracker, PendingStats};
pub use registry::ServiceRegistry;
pub use route::{EndpointPattern, RouteKey};
pub use types::*;
