//! Adapters binding the ports to concrete transports.
//!
//! - `http`: axum ingress feeding the dispatcher
//! - `rest_proxy`: reqwest client for REST-channel dispatch

pub mod http;
pub mod rest_proxy;

pub use http::build_router;
pub use rest_proxy::ReqwestRestProxy;
