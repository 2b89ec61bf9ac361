//! Wire messages between clients and the daemon.
//!
//! One JSON object per line over the Unix socket. Requests and responses are
//! paired by `id`; events carry no id and only reach subscribed connections.
//! Field names follow JSON-RPC, but there is no `jsonrpc` envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub id: u64,
    pub method: String,
    /// Missing params decode as `null`
    #[serde(default)]
    pub params: Value,
}

impl DaemonRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// Request with an empty params object
    pub fn no_params(id: u64, method: impl Into<String>) -> Self {
        Self::new(id, method, json!({}))
    }
}

/// Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DaemonError>,
}

impl DaemonResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: u64, error: DaemonError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// True when a draining daemon refused the request
    pub fn is_unavailable(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(|e| e.code == ErrorCode::SERVICE_UNAVAILABLE)
    }

    /// Split into the result value or the daemon's error.
    pub fn into_result(self) -> Result<Value, DaemonError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("[{code}] {message}")]
pub struct DaemonError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl DaemonError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PARSE_ERROR, message)
    }

    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::METHOD_NOT_FOUND,
            format!("Unknown method: {}", method.into()),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_PARAMS, message)
    }

    /// Refusal sent while the daemon drains; `data.method` names the request
    pub fn service_unavailable(method: &str) -> Self {
        Self::new(ErrorCode::SERVICE_UNAVAILABLE, "Service unavailable: shutting down")
            .with_data(json!({ "method": method }))
    }
}

/// Error codes. The negative ones are borrowed from JSON-RPC; 503 mirrors
/// HTTP's Service Unavailable.
pub struct ErrorCode;

impl ErrorCode {
    pub const PARSE_ERROR: i32 = -32700;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const SERVICE_UNAVAILABLE: i32 = 503;
}

/// Pushed to subscribed connections; has no id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonEvent {
    pub event: String,
    pub data: Value,
}

impl DaemonEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Sent once when shutdown begins, with the number still in flight
    pub fn shutting_down(active: usize) -> Self {
        Self::new(Events::SHUTTING_DOWN, json!({ "active": active }))
    }
}

pub struct Methods;

impl Methods {
    pub const PING: &'static str = "ping";
    pub const ECHO: &'static str = "echo";
    pub const STATUS: &'static str = "status";
    pub const SLEEP: &'static str = "sleep";
    /// Handled by the server itself; never reaches a `RequestHandler`
    pub const SUBSCRIBE: &'static str = "subscribe";
}

pub struct Events;

impl Events {
    pub const SHUTTING_DOWN: &'static str = "server.shutting_down";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_params() {
        let req = DaemonRequest::new(1, "sleep", json!({"ms": 10}));
        assert_eq!(req.params["ms"], 10);

        let req = DaemonRequest::no_params(42, "ping");
        assert!(req.params.is_object());
    }

    #[test]
    fn test_request_missing_params_decodes_as_null() {
        let req: DaemonRequest = serde_json::from_str(r#"{"id":3,"method":"status"}"#).unwrap();
        assert_eq!(req.id, 3);
        assert!(req.params.is_null());
    }

    #[test]
    fn test_unavailable_response() {
        let resp = DaemonResponse::error(7, DaemonError::service_unavailable("sleep"));
        assert!(!resp.is_success());
        assert!(resp.is_unavailable());

        let error = resp.into_result().unwrap_err();
        assert_eq!(error.code, 503);
        assert_eq!(error.data.unwrap()["method"], "sleep");
    }

    #[test]
    fn test_other_errors_are_not_unavailable() {
        let resp = DaemonResponse::error(1, DaemonError::invalid_params("bad"));
        assert!(!resp.is_success());
        assert!(!resp.is_unavailable());
    }

    #[test]
    fn test_into_result_success() {
        let resp = DaemonResponse::success(1, json!({"pong": true}));
        assert_eq!(resp.into_result().unwrap()["pong"], true);
    }

    #[test]
    fn test_error_display() {
        let err = DaemonError::method_not_found("frobnicate");
        assert_eq!(err.code, ErrorCode::METHOD_NOT_FOUND);
        assert_eq!(err.to_string(), "[-32601] Unknown method: frobnicate");
    }

    #[test]
    fn test_response_wire_format() {
        let json = serde_json::to_string(&DaemonResponse::success(1, json!("ok"))).unwrap();
        assert_eq!(json, r#"{"id":1,"result":"ok"}"#);

        let json =
            serde_json::to_string(&DaemonResponse::error(2, DaemonError::service_unavailable("echo")))
                .unwrap();
        assert!(!json.contains("result"));
        assert!(json.contains(r#""code":503"#));
    }

    #[test]
    fn test_shutting_down_event() {
        let event = DaemonEvent::shutting_down(3);
        assert_eq!(event.event, Events::SHUTTING_DOWN);
        assert_eq!(event.data["active"], 3);
    }
}
