//! Request handler decorator that brackets every request with enter/exit.

use log::debug;

use crate::drain::coordinator::Coordinator;
use crate::ipc::messages::{DaemonError, DaemonRequest, DaemonResponse};
use crate::ipc::server::RequestHandler;

/// Wraps a [`RequestHandler`] so the coordinator can wait for every request it
/// admitted, including requests whose connection the handler has taken over.
///
/// Once shutdown has begun, requests are answered with
/// [`ErrorCode::SERVICE_UNAVAILABLE`](crate::ipc::ErrorCode::SERVICE_UNAVAILABLE)
/// and the inner handler is not called. Methods listed with
/// [`with_untracked`](Self::with_untracked) bypass both the count and the
/// refusal, so they can still report on a drain in progress.
pub struct TrackedHandler<H> {
    coordinator: Coordinator,
    inner: H,
    untracked: &'static [&'static str],
}

impl<H: RequestHandler> TrackedHandler<H> {
    pub fn new(coordinator: Coordinator, inner: H) -> Self {
        Self {
            coordinator,
            inner,
            untracked: &[],
        }
    }

    /// Pass these methods straight to the inner handler
    pub fn with_untracked(mut self, methods: &'static [&'static str]) -> Self {
        self.untracked = methods;
        self
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    pub fn is_tracked(&self, method: &str) -> bool {
        !self.untracked.iter().any(|m| *m == method)
    }
}

impl<H: RequestHandler> RequestHandler for TrackedHandler<H> {
    fn handle(
        &self,
        request: DaemonRequest,
    ) -> impl std::future::Future<Output = DaemonResponse> + Send {
        async move {
            if !self.is_tracked(&request.method) {
                return self.inner.handle(request).await;
            }
            let Some(_guard) = self.coordinator.enter() else {
                debug!("Rejecting '{}' (id {}): shutting down", request.method, request.id);
                return DaemonResponse::error(
                    request.id,
                    DaemonError::service_unavailable(&request.method),
                );
            };
            self.inner.handle(request).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drain::Deadline;
    use crate::ipc::messages::ErrorCode;
    use crate::ipc::server::CallbackHandler;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SleepHandler {
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl RequestHandler for SleepHandler {
        fn handle(
            &self,
            request: DaemonRequest,
        ) -> impl std::future::Future<Output = DaemonResponse> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delay;
            async move {
                tokio::time::sleep(delay).await;
                DaemonResponse::success(request.id, serde_json::json!({"slept": true}))
            }
        }
    }

    struct PanicHandler;

    async fn crash() -> DaemonResponse {
        panic!("handler crashed");
    }

    impl RequestHandler for PanicHandler {
        fn handle(
            &self,
            _request: DaemonRequest,
        ) -> impl std::future::Future<Output = DaemonResponse> + Send {
            crash()
        }
    }

    #[tokio::test]
    async fn test_tracked_handler_passes_through() {
        let coordinator = Coordinator::new();
        let handler = TrackedHandler::new(
            coordinator.clone(),
            CallbackHandler::new(|req| DaemonResponse::success(req.id, serde_json::json!("ok"))),
        );

        let response = handler.handle(DaemonRequest::no_params(5, "ping")).await;
        assert!(response.is_success());
        assert_eq!(response.id, 5);
        assert_eq!(coordinator.active_count(), 0);
    }

    #[tokio::test]
    async fn test_tracked_handler_counts_in_flight() {
        let coordinator = Coordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(TrackedHandler::new(
            coordinator.clone(),
            SleepHandler {
                calls: Arc::clone(&calls),
                delay: Duration::from_millis(20),
            },
        ));

        let in_flight = Arc::clone(&handler);
        let task = tokio::spawn(async move {
            in_flight.handle(DaemonRequest::no_params(1, "sleep")).await
        });
        while coordinator.active_count() == 0 {
            tokio::task::yield_now().await;
        }

        let result = coordinator.shutdown(Deadline::after(Duration::from_secs(5))).await;
        assert_eq!(result, Ok(()));
        assert!(task.await.unwrap().is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tracked_handler_rejects_after_shutdown() {
        let coordinator = Coordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = TrackedHandler::new(
            coordinator.clone(),
            SleepHandler {
                calls: Arc::clone(&calls),
                delay: Duration::from_millis(1),
            },
        );

        coordinator.begin_shutdown();

        let response = handler.handle(DaemonRequest::no_params(8, "sleep")).await;
        assert!(response.is_unavailable());
        assert_eq!(response.id, 8);
        assert_eq!(response.error.unwrap().code, ErrorCode::SERVICE_UNAVAILABLE);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.active_count(), 0);
    }

    #[tokio::test]
    async fn test_tracked_handler_exits_on_panic() {
        let coordinator = Coordinator::new();
        let handler = Arc::new(TrackedHandler::new(coordinator.clone(), PanicHandler));

        let task = tokio::spawn(async move {
            handler.handle(DaemonRequest::no_params(1, "boom")).await
        });
        assert!(task.await.is_err());

        assert_eq!(coordinator.active_count(), 0);
        let result = coordinator.shutdown(Deadline::after(Duration::from_millis(10))).await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_untracked_method_bypasses_count_and_refusal() {
        let coordinator = Coordinator::new();
        let counter = coordinator.clone();
        let handler = TrackedHandler::new(
            coordinator.clone(),
            CallbackHandler::new(move |req| {
                DaemonResponse::success(req.id, serde_json::json!({"active": counter.active_count()}))
            }),
        )
        .with_untracked(&["status"]);

        assert!(handler.is_tracked("sleep"));
        assert!(!handler.is_tracked("status"));

        // Not counted while it runs
        let response = handler.handle(DaemonRequest::no_params(1, "status")).await;
        assert_eq!(response.result.unwrap()["active"], 0);

        // Still answered once draining, while tracked methods are refused
        assert!(coordinator.try_enter());
        coordinator.begin_shutdown();
        let response = handler.handle(DaemonRequest::no_params(2, "status")).await;
        assert_eq!(response.result.unwrap()["active"], 1);
        let refused = handler.handle(DaemonRequest::no_params(3, "other")).await;
        assert!(refused.is_unavailable());

        coordinator.exit();
        assert!(coordinator.is_quiescent());
    }
}
