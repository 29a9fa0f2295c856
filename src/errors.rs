use std::fmt;

use serde_json::{json, Value};
use thiserror::Error;

/// The closed set of JSON-RPC 2.0 error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
}

impl ErrorKind {
    pub fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
        }
    }
}

/// A classified JSON-RPC failure, rendered verbatim into the `error` member.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} ({code})", code = .kind.code())]
pub struct RpcError {
    pub kind: ErrorKind,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.default_message().to_string(),
            data: None,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(ErrorKind::ParseError)
    }

    pub fn invalid_request() -> Self {
        Self::new(ErrorKind::InvalidRequest)
    }

    pub fn method_not_found() -> Self {
        Self::new(ErrorKind::MethodNotFound)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams).with_message(message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError).with_message(message)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn code(&self) -> i64 {
        self.kind.code()
    }
}

/// What a registered handler may fail with.
///
/// `Rpc` errors reach the client unchanged. Anything else is a `Fault` and is
/// reported as an internal error carrying only the fault's message.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("{0}")]
    Fault(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    pub fn fault(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Fault(err.into())
    }

    pub fn into_rpc_error(self) -> RpcError {
        match self {
            Self::Rpc(err) => err,
            Self::Fault(err) => RpcError::internal(err.to_string()),
        }
    }
}

pub(crate) fn reason_data(reason: impl fmt::Display) -> Value {
    json!({ "reason": reason.to_string() })
}
