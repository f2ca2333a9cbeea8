//! Ports: the seams between the gateway core and its collaborators.

pub mod inbound;
pub mod outbound;

pub use inbound::Responder;
pub use outbound::{ProxyResult, RestProxy};
