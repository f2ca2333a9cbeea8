//! `reqwest` implementation of the [`RestProxy`] port.
//!
//! Services on the mesh commonly present self-signed certificates, so the
//! client accepts invalid TLS certificates. Non-2xx upstream answers are
//! results, not errors: their status and body are relayed to the caller.

use crate::domain::error::ProxyError;
use crate::ports::{ProxyResult, RestProxy};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Methods the proxy forwards. Anything else yields no result.
const SUPPORTED_METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::HEAD,
    Method::OPTIONS,
];

/// HTTP client used for REST-channel dispatch.
#[derive(Debug, Clone)]
pub struct ReqwestRestProxy {
    client: reqwest::Client,
}

impl ReqwestRestProxy {
    /// Build the proxy client.
    ///
    /// `timeout` bounds a single upstream call; the gateway deadline still
    /// applies on top of it.
    pub fn new(timeout: Option<Duration>) -> Result<Self, ProxyError> {
        let mut builder = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .connect_timeout(Duration::from_secs(10));

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| ProxyError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an already configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RestProxy for ReqwestRestProxy {
    async fn send_request(
        &self,
        method: &str,
        url: &str,
        body: Option<Value>,
        headers: BTreeMap<String, String>,
    ) -> Result<Option<ProxyResult>, ProxyError> {
        let Some(method) = parse_method(method) else {
            debug!(method, url, "Unsupported proxy method");
            return Ok(None);
        };

        let mut request = self.client.request(method, url);
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;
        let status_code = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(url, &e))?;

        debug!(url, status = status_code, "Upstream answered");
        Ok(Some(ProxyResult {
            status_code,
            body: decode_body(&bytes),
        }))
    }
}

fn parse_method(method: &str) -> Option<Method> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes()).ok()?;
    SUPPORTED_METHODS.contains(&method).then_some(method)
}

fn transport_error(url: &str, error: &reqwest::Error) -> ProxyError {
    if error.is_timeout() {
        ProxyError::Timeout {
            url: url.to_string(),
        }
    } else {
        ProxyError::Transport {
            url: url.to_string(),
            reason: error.to_string(),
        }
    }
}

/// JSON when it parses, text otherwise, `null` when empty.
fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
