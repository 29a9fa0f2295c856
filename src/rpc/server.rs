//! The JSON-RPC request cycle for one parsed payload
//!
//! Validates the envelope, dispatches to the registry, audits the call and
//! produces the response envelope. Every failure ends up as an `RpcResponse`.

use serde_json::Value;
use tracing::{info, warn};

use crate::rpc::{
    envelope::{validate_envelope, RequestId},
    response::RpcResponse,
};
use crate::AppState;

pub async fn handle_rpc_value(state: &AppState, payload: Value) -> RpcResponse {
    let request = match validate_envelope(payload) {
        Ok(request) => request,
        Err((id, err)) => {
            warn!(id = ?id, "invalid json-rpc envelope");
            return RpcResponse::failure(id, err);
        }
    };

    let audit_params = redact_audit_params(request.params.as_ref());
    let result = state
        .registry
        .dispatch(&request.method, request.params, state.handler_timeout)
        .await;
    let response = RpcResponse::from_result(request.id, result);

    info!(
        method = %request.method,
        id = %display_id(&response.id),
        params = %audit_params,
        outcome = if response.is_error() { "failure" } else { "success" },
        error_code = response.error_code(),
        "rpc call audited"
    );

    response
}

fn display_id(id: &RequestId) -> String {
    match id {
        RequestId::String(value) => value.clone(),
        RequestId::Number(value) => value.to_string(),
        RequestId::Null => "null".to_string(),
    }
}

/// Key fragments whose values never reach the audit log.
const SENSITIVE_KEY_MARKERS: [&str; 8] = [
    "token",
    "secret",
    "password",
    "credential",
    "apikey",
    "authorization",
    "cardnumber",
    "cvv",
];

const REDACTED: &str = "[REDACTED]";

/// Copy of `params` safe for logging; `Null` when no params were sent.
pub fn redact_audit_params(params: Option<&Value>) -> Value {
    let Some(params) = params else {
        return Value::Null;
    };

    match params {
        Value::Object(members) => members
            .iter()
            .map(|(key, member)| {
                let member = if is_sensitive_key(key) {
                    Value::from(REDACTED)
                } else {
                    redact_audit_params(Some(member))
                };
                (key.clone(), member)
            })
            .collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| redact_audit_params(Some(item)))
            .collect(),
        scalar => scalar.clone(),
    }
}

/// Matches case-insensitively, ignoring `_` and `-`, so `api_key`,
/// `card-number` and `clientSecret` are all caught.
pub fn is_sensitive_key(key: &str) -> bool {
    let folded: String = key
        .chars()
        .filter(|c| !matches!(c, '_' | '-'))
        .map(|c| c.to_ascii_lowercase())
        .collect();
    SENSITIVE_KEY_MARKERS
        .iter()
        .any(|marker| folded.contains(marker))
}
