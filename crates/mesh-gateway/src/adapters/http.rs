//! HTTP ingress: every request lands on one fallback handler that hands it
//! to the dispatcher together with a one-shot responder.

use crate::dispatch::{DispatchOutcome, RequestDispatcher};
use crate::domain::config::CorsConfig;
use crate::domain::types::{GatewayResponse, InboundRequest};
use crate::middleware::create_cors_layer;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

/// State shared by the ingress handler.
#[derive(Clone)]
struct IngressState {
    dispatcher: Arc<RequestDispatcher>,
}

/// Build the ingress router around `dispatcher`.
pub fn build_router(dispatcher: Arc<RequestDispatcher>, cors: &CorsConfig) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer(cors));

    Router::new()
        .fallback(handle_request)
        .layer(middleware)
        .with_state(IngressState { dispatcher })
}

async fn handle_request(
    State(state): State<IngressState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(e) => {
            debug!(path = uri.path(), error = %e, "Rejecting malformed JSON body");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": "Invalid JSON body" })),
            )
                .into_response();
        }
    };

    let request = InboundRequest {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        headers: collect_headers(&headers),
        body,
    };

    let (tx, rx) = oneshot::channel();
    match state.dispatcher.dispatch(request, Box::new(tx)).await {
        // Nothing behind the gateway claims this route
        DispatchOutcome::Fallthrough(_) => return StatusCode::NOT_FOUND.into_response(),
        DispatchOutcome::Dispatched { .. } | DispatchOutcome::NotFound | DispatchOutcome::Failed => {}
    }

    match rx.await {
        Ok(response) => into_http(response),
        Err(_) => {
            warn!(path = uri.path(), "Request dropped without a response");
            into_http(GatewayResponse::internal_error())
        }
    }
}

fn parse_body(bytes: &[u8]) -> Result<Option<Value>, serde_json::Error> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(bytes).map(Some)
}

/// Lowercased header map; repeated headers are joined with `", "`.
fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        collected
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    collected
}

fn into_http(response: GatewayResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.body)).into_response()
}
