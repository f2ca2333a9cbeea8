//! # Bus Messages
//!
//! Defines every message shape that flows through the bus.
//! Field names follow the camelCase wire format used by mesh services.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// All messages the mesh exchanges over the bus.
///
/// Decoded once at the transport boundary (see [`crate::wire`]) so consumers
/// match on variants instead of inspecting string fields.
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    // =========================================================================
    // SERVICE REGISTRY
    // =========================================================================
    /// A service instance announces availability.
    ServiceOnline(ServiceAnnouncement),

    /// A service instance announces departure.
    ServiceOffline {
        /// Instance that went away.
        instance_id: String,
        /// Service the instance belonged to.
        service_id: String,
    },

    /// Ask the registry for a snapshot of every known service.
    ServiceListQuery,

    /// Bulk registry snapshot answering a [`BusMessage::ServiceListQuery`].
    ServiceListResponse(Vec<ServiceEntry>),

    // =========================================================================
    // GATEWAY REQUEST / RESPONSE
    // =========================================================================
    /// Gateway asks a service to handle a proxied HTTP call.
    ProxyRequest(ProxyRequest),

    /// Service completes a proxied HTTP call.
    ProxyResponse(ProxyResponse),
}

impl BusMessage {
    /// Short name of the variant, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServiceOnline(_) => "service_online",
            Self::ServiceOffline { .. } => "service_offline",
            Self::ServiceListQuery => "service_list_query",
            Self::ServiceListResponse(_) => "service_list_response",
            Self::ProxyRequest(_) => "proxy_request",
            Self::ProxyResponse(_) => "proxy_response",
        }
    }

    /// Correlation id carried by request/response messages.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Self::ProxyRequest(request) => Some(&request.correlation_id),
            Self::ProxyResponse(response) => Some(&response.request_id),
            _ => None,
        }
    }
}

/// Transport a service accepts gateway traffic on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationChannel {
    /// Request/response over the message bus.
    Bus,
    /// Direct HTTP calls.
    Rest,
    /// Anything this gateway does not know how to use.
    #[serde(other)]
    Unknown,
}

/// A route claimed by a service.
///
/// Services may declare a bare path (`"/orders"`), a method and path in one
/// string (`"GET /orders"`), or an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EndpointSpec {
    /// `"/orders"` or `"GET /orders"`.
    Path(String),
    /// `{"method": "GET", "path": "/orders"}`.
    Route {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<String>,
        #[serde(alias = "endpoint", alias = "url")]
        path: String,
    },
}

/// Payload of a `SERVICE_ONLINE` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAnnouncement {
    #[serde(default, deserialize_with = "null_as_default")]
    pub instance_id: String,
    pub service_id: String,
    #[serde(
        default,
        rename = "supportedCommunicationChannels",
        deserialize_with = "null_as_default"
    )]
    pub supported_channels: Vec<CommunicationChannel>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default, deserialize_with = "lenient_port")]
    pub port: Option<u16>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub endpoints: Vec<EndpointSpec>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub commands: Vec<String>,
    /// Full instance list, when the announcer knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<Vec<String>>,
}

/// One service in a `SERVICE_LIST` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntry {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(
        default,
        rename = "supportedCommunicationChannels",
        deserialize_with = "null_as_default"
    )]
    pub supported_channels: Vec<CommunicationChannel>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default, deserialize_with = "lenient_port")]
    pub port: Option<u16>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub endpoints: Vec<EndpointSpec>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub commands: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub instances: Vec<String>,
}

impl ServiceEntry {
    /// Display name, falling back to the id when the registry sent none.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Gateway → service request.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyRequest {
    /// Route key (`method-path`) the request matched.
    pub route_id: String,
    /// Correlation id the response must echo as `requestId`.
    pub correlation_id: String,
    /// Instance id of the gateway that is waiting.
    pub gateway_id: String,
    /// Lowercase HTTP method.
    pub method: String,
    /// Request path.
    pub endpoint: String,
    /// Request body.
    pub data: Value,
}

/// Service → gateway response.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyResponse {
    /// Correlation id from the matching [`ProxyRequest`].
    pub request_id: String,
    /// HTTP status to relay.
    pub response_code: Option<u16>,
    /// JSON body to relay.
    pub response: Option<Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Ports arrive as numbers from most services and as strings from some.
fn lenient_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("port out of range: {n}"))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid port: {s}"))),
        Some(other) => Err(D::Error::custom(format!("invalid port: {other}"))),
    }
}
