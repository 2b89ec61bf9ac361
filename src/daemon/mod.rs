//! Daemon Core - request handlers and the serve loop
//!
//! The daemon is the long-running process that:
//! - Listens on a Unix socket for client requests
//! - Tracks every admitted request with a drain `Coordinator`
//! - On shutdown, stops the listener and drains in-flight requests together

use std::path::PathBuf;

pub mod handlers;
pub mod serve;

pub use handlers::DaemonHandler;
pub use serve::{Daemon, ServeOptions};

/// Default socket location under the user's local data directory
pub fn default_socket_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("drainr")
        .join("drainr.sock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_socket_path() {
        let path = default_socket_path();
        assert!(path.ends_with("drainr/drainr.sock"));
    }
}
