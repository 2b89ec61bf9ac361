//! IPC Server - Unix socket server for client-daemon communication
//!
//! Provides:
//! - Unix stream socket listener
//! - Client connection handling
//! - Request routing and response sending
//! - Event broadcasting to subscribers
//!
//! [`IpcServer::shutdown`] only stops the listener. Client tasks that are
//! already running are not waited for; track them with a
//! [`Coordinator`](crate::drain::Coordinator) instead.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{RwLock, broadcast, watch};

use crate::error::{DrainrError, Result};
use crate::ipc::messages::{DaemonError, DaemonEvent, DaemonRequest, DaemonResponse, Methods};

/// Configuration for the IPC server
#[derive(Debug, Clone)]
pub struct IpcServerConfig {
    pub socket_path: PathBuf,
    /// Connections beyond this are closed on accept
    pub max_clients: usize,
    /// Events buffered per subscriber before it starts lagging
    pub event_channel_capacity: usize,
}

impl Default for IpcServerConfig {
    fn default() -> Self {
        Self {
            socket_path: crate::daemon::default_socket_path(),
            max_clients: 16,
            event_channel_capacity: 256,
        }
    }
}

impl IpcServerConfig {
    /// Create config with custom socket path
    pub fn with_socket_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.socket_path = path.as_ref().to_path_buf();
        self
    }

    /// Set max clients
    pub fn with_max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }
}

/// Handler trait for processing requests
pub trait RequestHandler: Send + Sync {
    /// Handle a request and return a response
    fn handle(
        &self,
        request: DaemonRequest,
    ) -> impl std::future::Future<Output = DaemonResponse> + Send;
}

/// Simple handler that routes to a callback
pub struct CallbackHandler<F>
where
    F: Fn(DaemonRequest) -> DaemonResponse + Send + Sync,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(DaemonRequest) -> DaemonResponse + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> RequestHandler for CallbackHandler<F>
where
    F: Fn(DaemonRequest) -> DaemonResponse + Send + Sync,
{
    fn handle(
        &self,
        request: DaemonRequest,
    ) -> impl std::future::Future<Output = DaemonResponse> + Send {
        let result = (self.callback)(request);
        async move { result }
    }
}

/// Connected client state
#[derive(Debug)]
struct ClientState {
    /// Whether client is subscribed to events
    subscribed: bool,
}

/// IPC Server for daemon communication
pub struct IpcServer {
    config: IpcServerConfig,
    /// Connected clients
    clients: Arc<RwLock<HashMap<u64, ClientState>>>,
    /// Event broadcaster
    event_tx: broadcast::Sender<DaemonEvent>,
    /// Next client ID
    next_client_id: AtomicU64,
    /// Set once to stop the accept loop
    shutdown_tx: watch::Sender<bool>,
    /// True while the accept loop is running
    running_tx: watch::Sender<bool>,
}

impl IpcServer {
    /// Create a new IPC server with default config
    pub fn new() -> Self {
        Self::with_config(IpcServerConfig::default())
    }

    /// Create a new IPC server with custom config
    pub fn with_config(config: IpcServerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);
        let (shutdown_tx, _) = watch::channel(false);
        let (running_tx, _) = watch::channel(false);
        Self {
            config,
            clients: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            next_client_id: AtomicU64::new(1),
            shutdown_tx,
            running_tx,
        }
    }

    /// Get the socket path
    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Whether the accept loop is running
    pub fn is_running(&self) -> bool {
        *self.running_tx.borrow()
    }

    /// Wait until the accept loop has bound its socket
    pub async fn wait_until_running(&self) {
        let mut running_rx = self.running_tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = running_rx.wait_for(|running| *running).await;
    }

    /// Send an event to every connection; only subscribed ones forward it.
    /// Returns how many connections received it.
    pub fn broadcast(&self, event: DaemonEvent) -> Result<usize> {
        // A send error only means nobody is connected
        Ok(self.event_tx.send(event).unwrap_or(0))
    }

    /// Get count of connected clients
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Serve connections with `handler` until [`shutdown`](Self::shutdown).
    ///
    /// A server runs at most once; calling this after shutdown is an error.
    pub async fn run<H: RequestHandler + 'static>(&self, handler: Arc<H>) -> Result<()> {
        if *self.shutdown_tx.borrow() {
            return Err(DrainrError::Ipc("Server has already been shut down".into()));
        }

        let listener = self.bind()?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        self.running_tx.send_replace(true);
        info!("IPC server listening on {}", self.config.socket_path.display());

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => self.admit(stream, &handler).await,
                    Err(e) => warn!("Accept error: {}", e),
                },
                // Resolve to () so the watch read guard never outlives the wait
                _ = async { let _ = shutdown_rx.wait_for(|stop| *stop).await; } => break,
            }
        }

        // Close the listener before the path disappears
        drop(listener);
        if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
            warn!("Failed to remove socket file: {}", e);
        }
        self.running_tx.send_replace(false);
        info!("IPC server stopped accepting connections");
        Ok(())
    }

    /// Bind the socket, replacing a stale file from an earlier run
    fn bind(&self) -> Result<UnixListener> {
        let path = &self.config.socket_path;
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        UnixListener::bind(path).map_err(|e| DrainrError::Ipc(format!("Failed to bind socket: {}", e)))
    }

    /// Register a new connection and hand it to its own task
    async fn admit<H: RequestHandler + 'static>(&self, stream: UnixStream, handler: &Arc<H>) {
        let client_id = {
            let mut clients = self.clients.write().await;
            if clients.len() >= self.config.max_clients {
                warn!("Rejecting client: at capacity ({})", self.config.max_clients);
                return;
            }
            let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
            clients.insert(client_id, ClientState { subscribed: false });
            client_id
        };
        debug!("Client {} connected", client_id);

        let handler = Arc::clone(handler);
        let clients = Arc::clone(&self.clients);
        let event_rx = self.event_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, client_id, handler, clients, event_rx).await {
                debug!("Client {} ended with error: {}", client_id, e);
            }
        });
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    ///
    /// Connections already handed to client tasks keep running.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.is_running() {
            return Err(DrainrError::Ipc("Server is not running".into()));
        }
        self.shutdown_tx.send_replace(true);

        let mut running_rx = self.running_tx.subscribe();
        running_rx
            .wait_for(|running| !*running)
            .await
            .map_err(|e| DrainrError::Ipc(format!("Server state lost: {}", e)))?;
        Ok(())
    }
}

impl Default for IpcServer {
    fn default() -> Self {
        Self::new()
    }
}

async fn write_json<T: serde::Serialize>(writer: &mut OwnedWriteHalf, value: &T) -> Result<()> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    Ok(())
}

/// Answer one request line. `subscribe` is handled here; everything else
/// goes to the handler.
async fn dispatch<H: RequestHandler>(
    line: &str,
    client_id: u64,
    handler: &H,
    clients: &RwLock<HashMap<u64, ClientState>>,
) -> DaemonResponse {
    let request = match serde_json::from_str::<DaemonRequest>(line) {
        Ok(request) => request,
        Err(e) => {
            debug!("Client {} sent unparseable request: {}", client_id, e);
            return DaemonResponse::error(0, DaemonError::parse_error(format!("Parse error: {}", e)));
        }
    };

    if request.method == Methods::SUBSCRIBE {
        if let Some(state) = clients.write().await.get_mut(&client_id) {
            state.subscribed = true;
        }
        debug!("Client {} subscribed to events", client_id);
        return DaemonResponse::success(request.id, serde_json::json!({"subscribed": true}));
    }
    handler.handle(request).await
}

/// Serve one connection until EOF, a write failure, or the event channel
/// closing. Requests on a connection are answered in order.
async fn handle_client<H: RequestHandler>(
    stream: UnixStream,
    client_id: u64,
    handler: Arc<H>,
    clients: Arc<RwLock<HashMap<u64, ClientState>>>,
    mut event_rx: broadcast::Receiver<DaemonEvent>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let result = loop {
        tokio::select! {
            next = lines.next_line() => {
                let line = match next {
                    Ok(Some(line)) => line,
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e.into()),
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let response = dispatch(line, client_id, handler.as_ref(), &clients).await;
                if let Err(e) = write_json(&mut writer, &response).await {
                    break Err(e);
                }
            }
            received = event_rx.recv() => {
                match received {
                    Ok(event) => {
                        let subscribed = clients
                            .read()
                            .await
                            .get(&client_id)
                            .is_some_and(|state| state.subscribed);
                        if subscribed {
                            if let Err(e) = write_json(&mut writer, &event).await {
                                break Err(e);
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Client {} lagged, skipped {} events", client_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break Ok(()),
                }
            }
        }
    };

    clients.write().await.remove(&client_id);
    debug!("Client {} disconnected", client_id);
    result
}
