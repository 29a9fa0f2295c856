//! JSON-RPC 2.0 request envelope validation

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::errors::RpcError;

pub const JSONRPC_VERSION: &str = "2.0";

/// A request id as it appears on the wire. Absent and unreadable ids are
/// echoed as `Null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(Number),
    #[default]
    Null,
}

impl RequestId {
    /// Reads an id member, returning `None` for types an id may not have.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(id) => Some(Self::String(id.clone())),
            Value::Number(id) => Some(Self::Number(id.clone())),
            Value::Null => Some(Self::Null),
            Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// A request that passed envelope validation. `params` is not inspected.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub method: String,
    pub params: Option<Value>,
    pub id: RequestId,
}

/// Checks `payload` against the JSON-RPC 2.0 request shape.
///
/// On failure the returned id is whatever could be recovered for the echo.
pub fn validate_envelope(payload: Value) -> Result<RpcRequest, (RequestId, RpcError)> {
    let Value::Object(mut object) = payload else {
        return Err((RequestId::Null, RpcError::invalid_request()));
    };

    let id = match object.remove("id") {
        None => RequestId::Null,
        Some(value) => match RequestId::from_value(&value) {
            Some(id) => id,
            None => return Err((RequestId::Null, RpcError::invalid_request())),
        },
    };

    if !has_version(&object) {
        return Err((id, RpcError::invalid_request()));
    }

    let method = match object.remove("method") {
        Some(Value::String(method)) if !method.is_empty() => method,
        _ => return Err((id, RpcError::invalid_request())),
    };

    Ok(RpcRequest {
        method,
        params: object.remove("params"),
        id,
    })
}

fn has_version(object: &Map<String, Value>) -> bool {
    object.get("jsonrpc").and_then(Value::as_str) == Some(JSONRPC_VERSION)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::errors::ErrorKind;

    fn rejected(payload: Value) -> (RequestId, RpcError) {
        validate_envelope(payload).expect_err("envelope should be rejected")
    }

    #[test]
    fn accepts_minimal_request() {
        let request = validate_envelope(json!({"jsonrpc": "2.0", "method": "ping"}))
            .expect("valid envelope");
        assert_eq!(request.method, "ping");
        assert_eq!(request.params, None);
        assert_eq!(request.id, RequestId::Null);
    }

    #[test]
    fn passes_params_through_untouched() {
        let request = validate_envelope(json!({
            "jsonrpc": "2.0",
            "method": "add",
            "params": [1, "two", {"three": 3}],
            "id": "abc"
        }))
        .expect("valid envelope");
        assert_eq!(request.params, Some(json!([1, "two", {"three": 3}])));
        assert_eq!(request.id, RequestId::String("abc".to_string()));
    }

    #[test]
    fn missing_version_is_invalid_but_keeps_id() {
        let (id, err) = rejected(json!({"method": "add", "id": 7}));
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        assert_eq!(id, RequestId::Number(Number::from(7)));
    }

    #[test]
    fn wrong_version_is_invalid() {
        let (_, err) = rejected(json!({"jsonrpc": "1.0", "method": "add"}));
        assert_eq!(err.code(), -32600);
        let (_, err) = rejected(json!({"jsonrpc": 2.0, "method": "add"}));
        assert_eq!(err.code(), -32600);
    }

    #[test]
    fn method_must_be_non_empty_string() {
        for method in [json!(""), json!(42), json!(null), json!(["add"])] {
            let (_, err) = rejected(json!({"jsonrpc": "2.0", "method": method}));
            assert_eq!(err.kind, ErrorKind::InvalidRequest);
        }
        let (_, err) = rejected(json!({"jsonrpc": "2.0"}));
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
    }

    #[test]
    fn id_of_wrong_type_is_invalid_and_not_echoed() {
        for bad_id in [json!(true), json!([1]), json!({"n": 1})] {
            let (id, err) = rejected(json!({"jsonrpc": "2.0", "method": "add", "id": bad_id}));
            assert_eq!(err.kind, ErrorKind::InvalidRequest);
            assert_eq!(id, RequestId::Null);
        }
    }

    #[test]
    fn non_objects_are_invalid() {
        for payload in [json!([]), json!("request"), json!(1), json!(null)] {
            let (id, err) = rejected(payload);
            assert_eq!(err.kind, ErrorKind::InvalidRequest);
            assert_eq!(id, RequestId::Null);
        }
    }
}
