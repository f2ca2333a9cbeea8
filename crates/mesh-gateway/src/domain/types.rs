//! Core domain types for the gateway.

use crate::domain::route::EndpointPattern;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_bus::{CommunicationChannel, ServiceAnnouncement, ServiceEntry};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Transport used to reach a backend service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Request/response over the message bus.
    Bus,
    /// Direct HTTP through the reverse proxy.
    Rest,
}

impl Channel {
    /// Map a wire channel name; unknown transports are dropped.
    pub fn from_wire(channel: CommunicationChannel) -> Option<Self> {
        match channel {
            CommunicationChannel::Bus => Some(Self::Bus),
            CommunicationChannel::Rest => Some(Self::Rest),
            CommunicationChannel::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bus => "bus",
            Self::Rest => "rest",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The registry's record of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Service identity.
    pub id: String,
    /// Display name; also the service's bus topic.
    pub name: String,
    pub supported_channels: BTreeSet<Channel>,
    /// Used only for the rest channel.
    pub hostname: Option<String>,
    pub port: Option<u16>,
    /// Claimed routes, in declaration order.
    pub endpoints: Vec<EndpointPattern>,
    /// Bus command names the service handles.
    pub commands: Vec<String>,
    /// Instances currently reporting this service online.
    pub instances: Vec<String>,
}

impl ServiceDescriptor {
    /// Build a descriptor from a `SERVICE_ONLINE` announcement.
    ///
    /// Without an explicit instance list, the announcing instance joins
    /// `known_instances`.
    pub fn from_announcement(announcement: &ServiceAnnouncement, known_instances: &[String]) -> Self {
        let instances = match &announcement.instances {
            Some(instances) => instances.clone(),
            None => {
                let mut instances = known_instances.to_vec();
                if !announcement.instance_id.is_empty()
                    && !instances.contains(&announcement.instance_id)
                {
                    instances.push(announcement.instance_id.clone());
                }
                instances
            }
        };

        Self {
            id: announcement.service_id.clone(),
            name: announcement.service_id.clone(),
            supported_channels: announcement
                .supported_channels
                .iter()
                .copied()
                .filter_map(Channel::from_wire)
                .collect(),
            hostname: announcement.hostname.clone(),
            port: announcement.port,
            endpoints: announcement.endpoints.iter().map(EndpointPattern::from).collect(),
            commands: announcement.commands.clone(),
            instances,
        }
    }

    /// Build a descriptor from a `SERVICE_LIST` entry.
    pub fn from_entry(entry: &ServiceEntry) -> Self {
        Self {
            id: entry.id.clone(),
            name: entry.display_name().to_string(),
            supported_channels: entry
                .supported_channels
                .iter()
                .copied()
                .filter_map(Channel::from_wire)
                .collect(),
            hostname: entry.hostname.clone(),
            port: entry.port,
            endpoints: entry.endpoints.iter().map(EndpointPattern::from).collect(),
            commands: entry.commands.clone(),
            instances: entry.instances.clone(),
        }
    }

    pub fn supports(&self, channel: Channel) -> bool {
        self.supported_channels.contains(&channel)
    }

    /// Whether any declared endpoint matches the request.
    pub fn handles(&self, method: &str, path: &str) -> bool {
        self.endpoints.iter().any(|e| e.matches(method, path))
    }

    /// Whether `key` names this service by id or by name.
    pub fn is_named(&self, key: &str) -> bool {
        self.id == key || self.name == key
    }

    /// `http://hostname:port`, when the service is reachable over REST.
    pub fn rest_base_url(&self) -> Option<String> {
        let host = self.hostname.as_deref().filter(|h| !h.is_empty())?;
        Some(match self.port {
            Some(port) => format!("http://{host}:{port}"),
            None => format!("http://{host}"),
        })
    }
}

/// A terminal response written to the HTTP caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: Value,
}

impl GatewayResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// `404 {"message": "Not found"}`
    pub fn not_found() -> Self {
        Self::new(404, json!({ "message": "Not found" }))
    }

    /// `504 {"message": "Timed out"}`
    pub fn timed_out() -> Self {
        Self::new(504, json!({ "message": "Timed out" }))
    }

    /// `500 {"message": "Unknown server error"}`
    pub fn internal_error() -> Self {
        Self::new(500, json!({ "message": "Unknown server error" }))
    }
}

/// Which path completed a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionSource {
    /// A `ProxyResponse` arrived on a service topic.
    Bus,
    /// The REST proxy call returned.
    Proxy,
    /// The deadline fired first.
    Timeout,
    /// The dispatcher failed after registering the request.
    Failure,
}

impl fmt::Display for CompletionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bus => "bus",
            Self::Proxy => "proxy",
            Self::Timeout => "timeout",
            Self::Failure => "failure",
        })
    }
}

/// An inbound HTTP request as handed over by the ingress.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InboundRequest {
    pub method: String,
    /// Path without query string.
    pub path: String,
    /// Header names lowercased.
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON body, if any.
    pub body: Option<Value>,
}

impl InboundRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}
