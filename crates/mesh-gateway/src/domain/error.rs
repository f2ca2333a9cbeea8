//! Gateway error types.

use shared_bus::BusError;
use thiserror::Error;

/// Errors from constructing or running the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::domain::config::ConfigError),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(#[source] std::io::Error),

    /// Message bus error
    #[error("message bus error: {0}")]
    Bus(#[from] BusError),

    /// `start` called twice
    #[error("gateway already started")]
    AlreadyStarted,
}

/// Errors inside the dispatcher.
///
/// Raised after a route resolved; every variant either leaves the pending
/// entry for the deadline or becomes a `500` response.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The resolved service offers no channel this gateway can use.
    #[error("service `{service}` has no usable channel")]
    NoChannel { service: String },

    /// The service supports REST but has no hostname.
    #[error("service `{service}` has no REST address")]
    NoRestAddress { service: String },

    /// Correlation id already in the tracker.
    #[error("correlation id `{0}` already pending")]
    DuplicateCorrelationId(String),

    /// Publishing the request on the service topic failed.
    #[error("publish to `{topic}` failed: {source}")]
    Publish {
        topic: String,
        #[source]
        source: BusError,
    },
}

impl DispatchError {
    /// Whether the request stays pending and the deadline answers it.
    ///
    /// Dispatch failures after the outbound send was attempted bound caller
    /// latency to the configured timeout instead of failing fast.
    pub fn is_deferred_to_deadline(&self) -> bool {
        matches!(self, Self::Publish { .. })
    }
}

/// Errors from the outbound REST proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Connection, TLS, or protocol failure.
    #[error("upstream request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// The upstream did not answer in time.
    #[error("upstream request to {url} timed out")]
    Timeout { url: String },

    /// The HTTP client could not be built.
    #[error("http client error: {0}")]
    Client(String),
}
