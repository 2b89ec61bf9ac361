//! IPC client for talking to a running daemon.
//!
//! One connection carries both request/response pairs (matched by id) and,
//! after `subscribe`, pushed events.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, warn};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::daemon::default_socket_path;
use crate::error::{DrainrError, Result};
use crate::ipc::messages::{DaemonEvent, DaemonRequest, DaemonResponse, Methods};

/// Buffered events per client before the read loop applies backpressure
const EVENT_BUFFER: usize = 100;

/// Configuration for IPC client.
#[derive(Debug, Clone)]
pub struct IpcClientConfig {
    pub socket_path: PathBuf,
    /// How long a request waits for its response
    pub request_timeout_ms: u64,
}

impl Default for IpcClientConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            request_timeout_ms: 30000,
        }
    }
}

impl IpcClientConfig {
    pub fn with_socket(path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }
}

/// Responders waiting on the read loop, keyed by request id
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<DaemonResponse>>>>;

/// Client for one daemon connection.
pub struct IpcClient {
    config: IpcClientConfig,
    writer: Mutex<Option<OwnedWriteHalf>>,
    pending: Pending,
    next_id: AtomicU64,
    connected: Arc<AtomicBool>,
    events_tx: mpsc::Sender<DaemonEvent>,
    events_rx: Mutex<mpsc::Receiver<DaemonEvent>>,
}

impl IpcClient {
    pub fn new(config: IpcClientConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        Self {
            config,
            writer: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            connected: Arc::new(AtomicBool::new(false)),
            events_tx,
            events_rx: Mutex::new(events_rx),
        }
    }

    pub fn with_default_config() -> Self {
        Self::new(IpcClientConfig::default())
    }

    pub fn with_socket(path: impl Into<PathBuf>) -> Self {
        Self::new(IpcClientConfig::with_socket(path))
    }

    /// Connect and start the background read loop.
    pub async fn connect(&self) -> Result<()> {
        let stream = UnixStream::connect(&self.config.socket_path)
            .await
            .map_err(|e| DrainrError::Ipc(format!("Failed to connect: {}", e)))?;
        let (reader, writer) = stream.into_split();

        *self.writer.lock().await = Some(writer);
        self.connected.store(true, Ordering::SeqCst);

        tokio::spawn(read_loop(
            reader,
            Arc::clone(&self.pending),
            self.events_tx.clone(),
            Arc::clone(&self.connected),
        ));
        debug!("Connected to {}", self.config.socket_path.display());
        Ok(())
    }

    /// Close the write side; the daemon sees EOF and drops the connection.
    pub async fn disconnect(&self) -> Result<()> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Send a request and wait for the response with the same id.
    ///
    /// A refusal from a draining daemon is a normal response; check
    /// [`DaemonResponse::is_unavailable`].
    pub async fn request(&self, method: &str, params: Value) -> Result<DaemonResponse> {
        if !self.is_connected() {
            return Err(DrainrError::Ipc("Not connected".into()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.send(&DaemonRequest::new(id, method, params)).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        let timeout = Duration::from_millis(self.config.request_timeout_ms);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(DrainrError::Ipc("Connection closed before response".into())),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(DrainrError::Ipc(format!("Request '{}' timed out", method)))
            }
        }
    }

    async fn send(&self, request: &DaemonRequest) -> Result<()> {
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        let writer = writer
            .as_mut()
            .ok_or_else(|| DrainrError::Ipc("Writer not available".into()))?;
        writer
            .write_all(&line)
            .await
            .map_err(|e| DrainrError::Ipc(format!("Failed to write: {}", e)))?;
        Ok(())
    }

    pub async fn request_no_params(&self, method: &str) -> Result<DaemonResponse> {
        self.request(method, json!({})).await
    }

    /// Next pushed event; `None` once the connection is gone.
    pub async fn recv_event(&self) -> Option<DaemonEvent> {
        self.events_rx.lock().await.recv().await
    }

    pub async fn try_recv_event(&self) -> Option<DaemonEvent> {
        self.events_rx.lock().await.try_recv().ok()
    }

    pub async fn ping(&self) -> Result<bool> {
        let response = self.request_no_params(Methods::PING).await?;
        Ok(response.is_success())
    }

    /// In-flight count and whether the daemon is draining
    pub async fn status(&self) -> Result<DaemonResponse> {
        self.request_no_params(Methods::STATUS).await
    }

    /// Hold a request open on the daemon for `ms` milliseconds.
    pub async fn sleep(&self, ms: u64) -> Result<DaemonResponse> {
        self.request(Methods::SLEEP, json!({ "ms": ms })).await
    }

    /// Switch this connection to event streaming.
    pub async fn subscribe(&self) -> Result<DaemonResponse> {
        self.request_no_params(Methods::SUBSCRIBE).await
    }
}

/// A line from the daemon: a response carries an id, an event does not.
enum Incoming {
    Response(DaemonResponse),
    Event(DaemonEvent),
}

fn parse_line(line: &str) -> Option<Incoming> {
    if let Ok(response) = serde_json::from_str::<DaemonResponse>(line) {
        return Some(Incoming::Response(response));
    }
    serde_json::from_str::<DaemonEvent>(line).ok().map(Incoming::Event)
}

async fn read_loop(
    reader: OwnedReadHalf,
    pending: Pending,
    events_tx: mpsc::Sender<DaemonEvent>,
    connected: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Read error: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_line(line) {
            Some(Incoming::Response(response)) => {
                if let Some(responder) = pending.lock().await.remove(&response.id) {
                    let _ = responder.send(response);
                }
            }
            Some(Incoming::Event(event)) => {
                let _ = events_tx.send(event).await;
            }
            None => debug!("Ignoring unrecognized message: {}", line),
        }
    }

    connected.store(false, Ordering::SeqCst);
    // Dropping the responders wakes every waiter with a closed channel
    pending.lock().await.clear();
}
