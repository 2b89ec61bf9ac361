//! IPC Layer - Unix socket server and client for daemon communication
//!
//! This module provides:
//! - Message types for requests, responses and events
//! - Unix socket server for the daemon
//! - Client for talking to a running daemon

pub mod client;
pub mod messages;
pub mod server;

pub use client::{IpcClient, IpcClientConfig};
pub use messages::{
    DaemonError, DaemonEvent, DaemonRequest, DaemonResponse, ErrorCode, Events, Methods,
};
pub use server::{CallbackHandler, IpcServer, IpcServerConfig, RequestHandler};
