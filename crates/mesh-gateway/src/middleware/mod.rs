//! HTTP middleware applied around the ingress router.

pub mod cors;

pub use cors::create_cors_layer;
