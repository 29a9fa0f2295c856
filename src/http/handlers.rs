//! Axum HTTP handlers for the web server
//!
//! Provides the JSON-RPC endpoint and a health probe.

use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::RpcError;
use crate::http::body::{read_json_body, BodyError};
use crate::rpc::{envelope::RequestId, response::RpcResponse, server::handle_rpc_value};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn rpc_endpoint(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let payload = match read_json_body(&parts.method, &parts.headers, body, state.limits).await {
        Ok(payload) => payload,
        Err(BodyError::Aborted) => {
            // The client is gone; the transport drops whatever is returned here.
            debug!(path = %parts.uri.path(), "request body aborted by client");
            return ().into_response();
        }
        Err(err) => {
            if err.is_rejection() {
                warn!(method = %parts.method, error = %err, "request rejected");
            } else {
                warn!(error = %err, "request body unreadable");
            }
            return RpcResponse::failure(RequestId::Null, RpcError::from(err)).into_response();
        }
    };

    handle_rpc_value(&state, payload).await.into_response()
}
