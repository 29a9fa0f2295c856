use std::{sync::Arc, time::Duration};

use axum::{
    middleware,
    routing::{any, get},
    Router,
};

pub mod config;
pub mod errors;
pub mod http;
pub mod logging;
pub mod rpc;

use http::body::BodyLimits;
use rpc::registry::MethodRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<MethodRegistry>,
    pub limits: BodyLimits,
    pub handler_timeout: Option<Duration>,
}

impl AppState {
    pub fn new(
        registry: Arc<MethodRegistry>,
        limits: BodyLimits,
        handler_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            limits,
            handler_timeout,
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    // Any verb reaches the endpoint so that non-POST requests are answered
    // with a JSON-RPC parse error instead of a transport-level 405.
    Router::new()
        .route("/", any(http::handlers::rpc_endpoint))
        .route("/health", get(http::handlers::health))
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
