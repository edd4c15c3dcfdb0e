//! Catch-all fan-out handler
//!
//! Every method and path is relayed. The response is always `200` so the
//! webhook provider never schedules a retry because one dev instance was
//! down.

use crate::forward::{InboundRequest, RelayResponse};
use crate::AppState;
use axum::{extract::Request, extract::State, Json};
use tracing::error;

/// ANY /* - relay the request to every discovered target
pub async fn fan_out(State(state): State<AppState>, request: Request) -> Json<RelayResponse> {
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            error!(
                "Not relaying {} {}: failed to read body (limit {} bytes): {}",
                parts.method, parts.uri, state.max_body_bytes, e
            );
            return Json(RelayResponse::new(Vec::new()));
        }
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let inbound = InboundRequest {
        method: parts.method,
        path_and_query,
        headers: parts.headers,
        body,
    };

    Json(state.relay.relay(inbound).await)
}
