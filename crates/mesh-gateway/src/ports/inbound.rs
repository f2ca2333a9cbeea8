//! Inbound ports: how the ingress hands a caller to the gateway.

use crate::domain::types::GatewayResponse;
use tokio::sync::oneshot;

/// Writes exactly one terminal response to an HTTP caller.
///
/// Consuming `self` makes a second write unrepresentable.
pub trait Responder: Send + Sync {
    /// Deliver the response. Returns `false` if the caller is gone.
    fn respond(self: Box<Self>, response: GatewayResponse) -> bool;
}

impl Responder for oneshot::Sender<GatewayResponse> {
    fn respond(self: Box<Self>, response: GatewayResponse) -> bool {
        (*self).send(response).is_ok()
    }
}
