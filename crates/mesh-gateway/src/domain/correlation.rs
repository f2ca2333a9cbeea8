//! Correlation ID for request tracking.
//!
//! Formed as `route_key + "." + uuid-v4`, so the id is unpredictable while
//! still telling a log reader which route it belongs to.

use crate::domain::route::RouteKey;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use uuid::Uuid;

/// Correlation ID linking an inbound request to its asynchronous response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh id for a request on `route`.
    pub fn generate(route: &RouteKey) -> Self {
        Self(format!("{}.{}", route, Uuid::new_v4()))
    }

    /// Route key portion of the id.
    pub fn route_key(&self) -> &str {
        self.0
            .rsplit_once('.')
            .map_or(self.0.as_str(), |(route, _)| route)
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<CorrelationId> for String {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}

impl Borrow<str> for CorrelationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
