//! Gateway configuration with validation.
//!
//! Every field has a default; [`GatewayConfig::apply_env`] layers the
//! process environment on top.

use serde::{Deserialize, Serialize};
use shared_bus::{DEFAULT_CHANNEL_CAPACITY, SERVICE_REGISTRY_TOPIC};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Headers copied from the inbound request onto REST-proxied calls.
pub const DEFAULT_FORWARDED_HEADERS: &[&str] = &[
    "content-type",
    "user-agent",
    "x-auth-token",
    "st-api-key",
    "st-api-sign",
    "st-api-signature",
    "st-api-timestamp",
];

/// Response headers exposed to browser clients by default.
pub const DEFAULT_EXPOSED_HEADERS: &[&str] = &[
    "content-type",
    "content-length",
    "content-range",
    "x-auth-token",
    "origin",
];

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP ingress configuration
    pub http: HttpConfig,
    /// Message bus configuration
    pub bus: BusConfig,
    /// This gateway's identity on the mesh
    pub identity: IdentityConfig,
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Routing policy
    pub routing: RoutingConfig,
    /// CORS configuration
    pub cors: CorsConfig,
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeouts.request.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "request timeout cannot be 0".into(),
            ));
        }

        if self.identity.service_id.trim().is_empty() {
            return Err(ConfigError::Invalid("service_id cannot be empty".into()));
        }

        if self.bus.enabled && self.bus.registry_topic.trim().is_empty() {
            return Err(ConfigError::Invalid("registry_topic cannot be empty".into()));
        }

        if self.bus.channel_capacity == 0 {
            return Err(ConfigError::Invalid("channel_capacity cannot be 0".into()));
        }

        if self
            .routing
            .forwarded_headers
            .iter()
            .any(|h| h.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "forwarded_headers cannot contain an empty name".into(),
            ));
        }

        if self.cors.allow_credentials && self.cors.allowed_origins.iter().any(|o| o == "*") {
            return Err(ConfigError::Invalid(
                "CORS credentials cannot be combined with a wildcard origin".into(),
            ));
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }

    /// Override fields from environment-style variables.
    ///
    /// `lookup` is usually `|k| std::env::var(k).ok()`; tests pass a map.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(ms) = get("REQUEST_TIMEOUT") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("REQUEST_TIMEOUT", ms.clone()))?;
            self.timeouts.request = Duration::from_millis(ms);
        }
        if let Some(port) = get("REST_PORT") {
            self.http.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("REST_PORT", port.clone()))?;
        }
        if let Some(host) = get("REST_HOST") {
            self.http.host = host
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("REST_HOST", host.clone()))?;
        }
        if let Some(flag) = get("REST_SERVER") {
            self.http.enabled = flag != "false";
        }
        if let Some(flag) = get("MESSAGE_BUS") {
            self.bus.enabled = flag != "false";
        }
        if let Some(client_id) = get("CLIENT_ID") {
            self.bus.client_id = client_id;
        }
        if let Some(group_id) = get("GROUP_ID") {
            self.bus.group_id = group_id;
        }
        if let Some(servers) = get("KAFKA_BOOTSTRAP_SERVER") {
            self.bus.bootstrap_servers = servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(service_id) = get("SERVICE_ID") {
            self.identity.service_id = service_id;
        }
        if let Some(instance_id) = get("INSTANCE_ID") {
            self.identity.instance_id = instance_id;
        }
        if let Some(policy) = get("UNMATCHED_ROUTE") {
            self.routing.unmatched = match policy.as_str() {
                "not-found" | "404" => UnmatchedRoute::NotFound,
                "fallthrough" => UnmatchedRoute::Fallthrough,
                _ => return Err(ConfigError::InvalidEnv("UNMATCHED_ROUTE", policy.clone())),
            };
        }
        if let Some(origins) = get("CORS_ORIGINS") {
            self.cors.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(())
    }
}

/// HTTP ingress configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 8000, 0 picks a free port)
    pub port: u16,
    /// Enable HTTP server
    pub enabled: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8000,
            enabled: true,
        }
    }
}

/// Message bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Enable the bus channel and registry sync
    pub enabled: bool,
    /// Client id presented to an external broker
    pub client_id: String,
    /// Consumer group on an external broker
    pub group_id: String,
    /// External broker addresses. The bundled bus runs in-process and only
    /// reports these at startup.
    pub bootstrap_servers: Vec<String>,
    /// Topic carrying registry events
    pub registry_topic: String,
    /// Per-topic buffer for the in-memory bus
    pub channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            client_id: "gateway".to_string(),
            group_id: "gateway".to_string(),
            bootstrap_servers: vec!["localhost:9092".to_string()],
            registry_topic: SERVICE_REGISTRY_TOPIC.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl BusConfig {
    /// Broker addresses as one comma-separated string, for logging.
    pub fn broker_endpoint(&self) -> String {
        self.bootstrap_servers.join(",")
    }
}

/// The gateway's own identity on the mesh
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Service id; registry events for it are not subscribed to
    pub service_id: String,
    /// Instance id, sent as `gatewayId` on bus requests
    pub instance_id: String,
    /// Hostname announced to the registry
    pub hostname: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            service_id: "gateway".to_string(),
            instance_id: uuid::Uuid::new_v4().to_string(),
            hostname: "gateway-proxy".to_string(),
        }
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for every dispatched request
    #[serde(with = "humantime_serde")]
    pub request: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
        }
    }
}

/// What to do with a request no service claims.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnmatchedRoute {
    /// Reply `404 Not found`.
    #[default]
    NotFound,
    /// Hand the request back to the ingress.
    Fallthrough,
}

/// Routing policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Unmatched route policy
    pub unmatched: UnmatchedRoute,
    /// Header allow-list for REST forwarding (lowercase)
    pub forwarded_headers: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            unmatched: UnmatchedRoute::NotFound,
            forwarded_headers: DEFAULT_FORWARDED_HEADERS
                .iter()
                .map(|h| h.to_string())
                .collect(),
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Enable CORS
    pub enabled: bool,
    /// Allowed origins ("*" for all)
    pub allowed_origins: Vec<String>,
    /// Allowed methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Response headers readable by browser clients
    pub expose_headers: Vec<String>,
    /// Max age for preflight cache
    pub max_age: u64,
    /// Allow credentials
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: vec!["*".to_string()],
            expose_headers: DEFAULT_EXPOSED_HEADERS
                .iter()
                .map(|h| h.to_string())
                .collect(),
            max_age: 86400, // 24 hours
            allow_credentials: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Environment variable that does not parse
    #[error("invalid value for {0}: {1:?}")]
    InvalidEnv(&'static str, String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            // Plain numbers are milliseconds, like REQUEST_TIMEOUT
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid duration format")
        }
    }
}
