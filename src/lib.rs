//! Drainr - graceful shutdown for servers whose handlers take over their connections
//!
//! A listener's shutdown stops new connections but cannot wait for handlers
//! that hijacked theirs. `drain::Coordinator` counts those handlers, refuses
//! new ones once shutdown begins, and signals when the last one leaves.
//! The `daemon` and `ipc` modules put it to work in a Unix socket server.

pub mod daemon;
pub mod drain;
pub mod error;
pub mod ipc;

pub use error::{DrainrError, Result};
