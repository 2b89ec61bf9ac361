//! Serve loop: run the IPC server until a stop signal, then drain.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::task::JoinHandle;

use crate::daemon::handlers::{DaemonHandler, UNTRACKED_METHODS};
use crate::drain::{Coordinator, Deadline, TrackedHandler, join_with_external_shutdown};
use crate::error::{DrainrError, Result};
use crate::ipc::messages::DaemonEvent;
use crate::ipc::server::{IpcServer, IpcServerConfig};

/// Options for running the daemon
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub server: IpcServerConfig,
    /// How long shutdown waits for in-flight requests and the listener
    pub drain_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            server: IpcServerConfig::default(),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

/// A daemon whose requests are tracked so shutdown can wait for them
pub struct Daemon {
    coordinator: Coordinator,
    server: Arc<IpcServer>,
    drain_timeout: Duration,
}

impl Daemon {
    pub fn new(options: ServeOptions) -> Self {
        Self {
            coordinator: Coordinator::new(),
            server: Arc::new(IpcServer::with_config(options.server)),
            drain_timeout: options.drain_timeout,
        }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn server(&self) -> &Arc<IpcServer> {
        &self.server
    }

    /// Serve until `signal` resolves, then stop the listener and drain
    /// in-flight requests under one deadline.
    ///
    /// Returns early with the server's error if it fails to start or stops
    /// on its own.
    pub async fn run_until<S>(&self, signal: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        let handler = Arc::new(
            TrackedHandler::new(
                self.coordinator.clone(),
                DaemonHandler::new(self.coordinator.clone()),
            )
            .with_untracked(UNTRACKED_METHODS),
        );
        let server = Arc::clone(&self.server);
        let mut run = tokio::spawn(async move { server.run(handler).await });

        tokio::select! {
            _ = self.server.wait_until_running() => {}
            result = &mut run => return flatten(result),
        }
        info!("Daemon ready on {}", self.server.socket_path().display());

        tokio::select! {
            _ = signal => {}
            result = &mut run => {
                warn!("Server stopped before a shutdown signal");
                return flatten(result);
            }
        }

        // Refuse new work before announcing the drain
        self.coordinator.begin_shutdown();
        let active = self.coordinator.active_count();
        info!("Shutting down: draining {} in-flight request(s)", active);
        // The drain must run even if nobody hears about it
        if let Err(e) = self.server.broadcast(DaemonEvent::shutting_down(active)) {
            warn!("Failed to announce shutdown: {}", e);
        }

        let outcome = join_with_external_shutdown(
            &self.coordinator,
            Deadline::after(self.drain_timeout),
            self.server.shutdown(),
        )
        .await;

        if let Err(e) = flatten(run.await) {
            warn!("Server exited with error: {}", e);
        }

        match outcome {
            Ok(()) => {
                info!("Shutdown complete");
                Ok(())
            }
            Err(errors) => {
                warn!("{}", errors);
                Err(errors.into())
            }
        }
    }
}

fn flatten(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined.map_err(|e| DrainrError::Ipc(format!("Server task failed: {}", e)))?
}

/// Spawn a daemon on its own task, stopping it when `signal` resolves
pub fn spawn<S>(daemon: Arc<Daemon>, signal: S) -> JoinHandle<Result<()>>
where
    S: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move { daemon.run_until(signal).await })
}
