use std::sync::Arc;

use jrpc_app::{
    build_app,
    config::Config,
    errors::RpcError,
    logging,
    rpc::registry::{MethodRegistry, RegistryError},
    AppState,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
struct AddParams {
    a: i64,
    b: i64,
}

#[derive(Debug, Deserialize)]
struct CreateOrderParams {
    #[serde(default)]
    id: u64,
    description: String,
}

#[derive(Debug, Serialize)]
struct CreateOrderResult {
    id: u64,
}

async fn create_order(params: CreateOrderParams) -> Result<CreateOrderResult, RpcError> {
    if params.id == 0 {
        return Err(RpcError::invalid_params("id is required"));
    }
    info!(order_id = params.id, description = %params.description, "order created");
    Ok(CreateOrderResult { id: params.id })
}

fn demo_registry() -> Result<MethodRegistry, RegistryError> {
    MethodRegistry::builder()
        .sync_method("add", |params: AddParams| {
            Ok::<_, RpcError>(params.a + params.b)
        })
        .method("createOrder", create_order)
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let registry = Arc::new(demo_registry()?);
    let bind_socket = config.bind_socket()?;
    let state = AppState::new(
        registry.clone(),
        config.body_limits(),
        config.handler_timeout(),
    );
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        max_body_bytes = config.max_body_bytes,
        handler_timeout_ms = config.handler_timeout_ms,
        methods = ?registry.methods().collect::<Vec<_>>(),
        "server starting"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
