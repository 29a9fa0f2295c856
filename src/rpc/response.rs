//! JSON-RPC response envelopes and their HTTP rendering
//!
//! Protocol failures are carried in the `error` member; the HTTP status is
//! always 200.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::errors::RpcError;
use crate::rpc::envelope::{RequestId, JSONRPC_VERSION};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<RpcError> for ErrorObject {
    fn from(err: RpcError) -> Self {
        Self {
            code: err.code(),
            message: err.message,
            data: err.data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(ErrorObject),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub id: RequestId,
}

impl RpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            outcome: Outcome::Result(result),
            id,
        }
    }

    pub fn failure(id: RequestId, err: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            outcome: Outcome::Error(err.into()),
            id,
        }
    }

    pub fn from_result(id: RequestId, result: Result<Value, RpcError>) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(err) => Self::failure(id, err),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    pub fn error_code(&self) -> Option<i64> {
        match &self.outcome {
            Outcome::Error(err) => Some(err.code),
            Outcome::Result(_) => None,
        }
    }
}

impl IntoResponse for RpcResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
