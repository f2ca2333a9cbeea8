//! Outbound ports for the gateway.

use crate::domain::error::ProxyError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

/// Normalized result of one upstream HTTP call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResult {
    pub status_code: u16,
    pub body: Value,
}

/// Performs one HTTP call to a REST-capable service.
#[async_trait]
pub trait RestProxy: Send + Sync {
    /// Send `method url` with an optional JSON body and the given headers.
    ///
    /// `Ok(None)` means the call produced no usable result (for example an
    /// unsupported method); the dispatcher answers `404` for it.
    async fn send_request(
        &self,
        method: &str,
        url: &str,
        body: Option<Value>,
        headers: BTreeMap<String, String>,
    ) -> Result<Option<ProxyResult>, ProxyError>;
}
