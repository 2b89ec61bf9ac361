//! Request handlers for the daemon
//!
//! Each method is a free function; `DaemonHandler` routes requests to them.

use std::time::Duration;

use log::debug;
use serde_json::{Value, json};

use crate::drain::Coordinator;
use crate::ipc::messages::{DaemonError, DaemonRequest, DaemonResponse, Methods};
use crate::ipc::server::RequestHandler;

/// Longest a single `sleep` request may hold its connection
pub const MAX_SLEEP_MS: u64 = 60 * 60 * 1000;

/// Methods that report on the daemon rather than do work. They are not
/// counted as in flight and keep answering while the daemon drains.
pub const UNTRACKED_METHODS: &[&str] = &[Methods::STATUS];

/// Handle ping
pub fn handle_ping(id: u64) -> DaemonResponse {
    DaemonResponse::success(id, json!({"pong": true}))
}

/// Handle echo - return params unchanged
pub fn handle_echo(id: u64, params: Value) -> DaemonResponse {
    DaemonResponse::success(id, params)
}

/// Handle status - report drain state
pub fn handle_status(id: u64, coordinator: &Coordinator) -> DaemonResponse {
    DaemonResponse::success(
        id,
        json!({
            "active": coordinator.active_count(),
            "shutdown_requested": coordinator.is_shutdown_requested(),
        }),
    )
}

/// Handle sleep - hold the request open, like a long-lived session that took
/// over its connection
pub async fn handle_sleep(id: u64, params: &Value) -> DaemonResponse {
    let ms = match params["ms"].as_u64() {
        Some(ms) => ms,
        None => {
            return DaemonResponse::error(
                id,
                DaemonError::invalid_params("Missing or invalid 'ms' parameter"),
            );
        }
    };
    if ms > MAX_SLEEP_MS {
        return DaemonResponse::error(
            id,
            DaemonError::invalid_params(format!("'ms' must be at most {}", MAX_SLEEP_MS)),
        );
    }

    tokio::time::sleep(Duration::from_millis(ms)).await;
    DaemonResponse::success(id, json!({"slept_ms": ms}))
}

/// Routes daemon methods to their handlers
pub struct DaemonHandler {
    coordinator: Coordinator,
}

impl DaemonHandler {
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }
}

impl RequestHandler for DaemonHandler {
    fn handle(
        &self,
        request: DaemonRequest,
    ) -> impl std::future::Future<Output = DaemonResponse> + Send {
        async move {
            debug!("Handling '{}' (id {})", request.method, request.id);
            match request.method.as_str() {
                Methods::PING => handle_ping(request.id),
                Methods::ECHO => handle_echo(request.id, request.params),
                Methods::STATUS => handle_status(request.id, &self.coordinator),
                Methods::SLEEP => handle_sleep(request.id, &request.params).await,
                other => DaemonResponse::error(request.id, DaemonError::method_not_found(other)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::messages::ErrorCode;

    fn handler() -> (Coordinator, DaemonHandler) {
        let coordinator = Coordinator::new();
        (coordinator.clone(), DaemonHandler::new(coordinator))
    }

    #[tokio::test]
    async fn test_ping() {
        let (_, handler) = handler();
        let response = handler.handle(DaemonRequest::no_params(1, "ping")).await;
        assert_eq!(response.result.unwrap()["pong"], true);
    }

    #[tokio::test]
    async fn test_echo() {
        let (_, handler) = handler();
        let response = handler
            .handle(DaemonRequest::new(2, "echo", json!({"hello": "world"})))
            .await;
        assert_eq!(response.result.unwrap()["hello"], "world");
    }

    #[tokio::test]
    async fn test_status_reports_coordinator() {
        let (coordinator, handler) = handler();
        assert!(coordinator.try_enter());

        let response = handler.handle(DaemonRequest::no_params(3, "status")).await;
        let result = response.result.unwrap();
        assert_eq!(result["active"], 1);
        assert_eq!(result["shutdown_requested"], false);

        coordinator.exit();
        coordinator.begin_shutdown();
        let response = handler.handle(DaemonRequest::no_params(4, "status")).await;
        let result = response.result.unwrap();
        assert_eq!(result["active"], 0);
        assert_eq!(result["shutdown_requested"], true);
    }

    #[tokio::test]
    async fn test_sleep() {
        let (_, handler) = handler();
        let response = handler
            .handle(DaemonRequest::new(5, "sleep", json!({"ms": 5})))
            .await;
        assert_eq!(response.result.unwrap()["slept_ms"], 5);
    }

    #[tokio::test]
    async fn test_sleep_missing_ms() {
        let (_, handler) = handler();
        let response = handler.handle(DaemonRequest::no_params(6, "sleep")).await;
        assert_eq!(response.error.unwrap().code, ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_sleep_too_long() {
        let (_, handler) = handler();
        let response = handler
            .handle(DaemonRequest::new(7, "sleep", json!({"ms": MAX_SLEEP_MS + 1})))
            .await;
        assert_eq!(response.error.unwrap().code, ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (_, handler) = handler();
        let response = handler.handle(DaemonRequest::no_params(8, "frobnicate")).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, ErrorCode::METHOD_NOT_FOUND);
        assert!(error.message.contains("frobnicate"));
    }
}
