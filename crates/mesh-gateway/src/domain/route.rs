//! Route keys and endpoint patterns.
//!
//! A service claims routes as [`EndpointPattern`]s. Paths compare segment by
//! segment; a segment written `:name` or `{name}` matches any single segment
//! and a final `*` matches whatever remains. Trailing slashes are ignored.

use serde::{Deserialize, Serialize};
use shared_bus::EndpointSpec;
use std::fmt;

/// `lowercase(method) + "-" + path`, the identity of a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteKey(String);

impl RouteKey {
    /// Derive the key for an inbound request.
    pub fn new(method: &str, path: &str) -> Self {
        Self(format!("{}-{}", method.to_ascii_lowercase(), path))
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<RouteKey> for String {
    fn from(key: RouteKey) -> Self {
        key.0
    }
}

/// A method and path shape a service declares it handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointPattern {
    /// Uppercase HTTP method; `None` matches any method.
    pub method: Option<String>,
    /// Normalized path (leading slash, no trailing slash).
    pub path: String,
}

impl EndpointPattern {
    /// Build a pattern from an optional method and a path.
    pub fn new(method: Option<&str>, path: &str) -> Self {
        Self {
            method: method
                .map(str::trim)
                .filter(|m| !m.is_empty() && *m != "*")
                .map(str::to_ascii_uppercase),
            path: normalize_path(path),
        }
    }

    /// Parse the string form: `"/orders"` or `"GET /orders"`.
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        match spec.split_once(char::is_whitespace) {
            Some((method, path)) if !method.starts_with('/') => Self::new(Some(method), path.trim()),
            _ => Self::new(None, spec),
        }
    }

    /// Whether a request with `method` and `path` falls under this pattern.
    pub fn matches(&self, method: &str, path: &str) -> bool {
        let method_ok = self
            .method
            .as_deref()
            .map_or(true, |m| m.eq_ignore_ascii_case(method));

        method_ok && self.matches_path(path)
    }

    fn matches_path(&self, path: &str) -> bool {
        let mut pattern = segments(&self.path).peekable();
        let mut actual = segments(path);

        loop {
            match (pattern.next(), actual.next()) {
                (Some("*"), _) if pattern.peek().is_none() => return true,
                (Some(p), Some(a)) if p == a || is_param(p) => continue,
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

impl From<&EndpointSpec> for EndpointPattern {
    fn from(spec: &EndpointSpec) -> Self {
        match spec {
            EndpointSpec::Path(s) => Self::parse(s),
            EndpointSpec::Route { method, path } => Self::new(method.as_deref(), path),
        }
    }
}

impl fmt::Display for EndpointPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method {
            Some(method) => write!(f, "{} {}", method, self.path),
            None => f.write_str(&self.path),
        }
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn is_param(segment: &str) -> bool {
    (segment.len() > 1 && segment.starts_with(':'))
        || (segment.len() > 2 && segment.starts_with('{') && segment.ends_with('}'))
}

fn normalize_path(path: &str) -> String {
    let joined = segments(path.trim()).collect::<Vec<_>>().join("/");
    format!("/{joined}")
}
