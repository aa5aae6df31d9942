//! Wire types
//!
//! ```text
//! request   {"id":1,"method":"test","params":{...}}
//! success   {"id":1,"result":{...}}
//! failure   {"id":1,"error":{"code":-32000,"message":"...","data":...}}
//! ready     {"ready":true}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Line was not valid JSON
pub const PARSE_ERROR: i64 = -32700;
/// Valid JSON but not a request object
pub const INVALID_REQUEST: i64 = -32600;
/// Params missing or of the wrong shape
pub const INVALID_PARAMS: i64 = -32602;
/// Handler failure, including unknown methods
pub const SERVER_ERROR: i64 = -32000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, "Parse error", Some(Value::String(detail.into())))
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(
            INVALID_REQUEST,
            "Invalid Request",
            Some(Value::String(detail.into())),
        )
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, detail, None)
    }

    pub fn unknown_method(name: &str) -> Self {
        Self::new(SERVER_ERROR, format!("Unknown method: {}", name), None)
    }
}

/// Either half of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcOutcome {
    Result(Value),
    Error(RpcError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: Value,
    #[serde(flatten)]
    pub outcome: RpcOutcome,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            outcome: RpcOutcome::Result(result),
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            id,
            outcome: RpcOutcome::Error(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, RpcOutcome::Error(_))
    }

    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.outcome {
            RpcOutcome::Result(value) => Ok(value),
            RpcOutcome::Error(error) => Err(error),
        }
    }
}

/// Written once by the sidecar before it reads any request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadySignal {
    pub ready: bool,
}

impl ReadySignal {
    pub fn is_ready_line(value: &Value) -> bool {
        value.get("ready").and_then(Value::as_bool) == Some(true) && value.get("id").is_none()
    }
}

/// A password entry as carried over the wire, label and password in clear
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRecord {
    pub id: u64,
    pub owner: String,
    pub label: String,
    pub password: String,
    pub randomness: u64,
    #[serde(default)]
    pub shared_with: Vec<String>,
}

/// Serialize `value` as one protocol line, newline included
pub fn to_line<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_shape() {
        let response = RpcResponse::success(json!(1), json!({"success": true}));
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"id":1,"result":{"success":true}}"#
        );
    }

    #[test]
    fn test_null_result_is_kept() {
        let response = RpcResponse::success(json!(7), Value::Null);
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"id":7,"result":null}"#
        );
        let parsed: RpcResponse = serde_json::from_str(r#"{"id":7,"result":null}"#).unwrap();
        assert_eq!(parsed.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_parse_error_shape() {
        let response = RpcResponse::failure(Value::Null, RpcError::parse_error("EOF"));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], json!(-32700));
        assert_eq!(value["error"]["message"], json!("Parse error"));
        assert_eq!(value["error"]["data"], json!("EOF"));
    }

    #[test]
    fn test_error_without_data_omits_field() {
        let response = RpcResponse::failure(json!(2), RpcError::unknown_method("doesNotExist"));
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"id":2,"error":{"code":-32000,"message":"Unknown method: doesNotExist"}}"#
        );
    }

    #[test]
    fn test_request_defaults() {
        let request: RpcRequest = serde_json::from_str(r#"{"method":"test"}"#).unwrap();
        assert_eq!(request.id, Value::Null);
        assert!(request.params.is_none());

        let line = to_line(&RpcRequest::new(3, "getAddress", None)).unwrap();
        assert_eq!(line, "{\"id\":3,\"method\":\"getAddress\"}\n");
    }

    #[test]
    fn test_ready_line_detection() {
        assert!(ReadySignal::is_ready_line(&json!({"ready": true})));
        assert!(!ReadySignal::is_ready_line(&json!({"ready": false})));
        assert!(!ReadySignal::is_ready_line(
            &json!({"id": 1, "result": {}, "ready": true})
        ));
    }
}
