//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - serve: run the daemon until SIGINT/SIGTERM, then drain
//! - call: send an arbitrary method to a running daemon
//! - ping: check that a daemon answers
//! - status: show in-flight count and shutdown state

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Drainr - a Unix socket daemon that drains in-flight requests on shutdown
#[derive(Parser, Debug)]
#[command(name = "drainr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Socket path (overrides config)
    #[arg(short, long, global = true)]
    pub socket: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the daemon in the foreground
    Serve {
        /// How long shutdown waits for in-flight requests (overrides config)
        #[arg(long)]
        drain_timeout_ms: Option<u64>,
    },

    /// Call a method on a running daemon
    Call {
        /// Method name (ping, echo, status, sleep)
        method: String,

        /// JSON params
        #[arg(short, long)]
        params: Option<String>,
    },

    /// Check that the daemon answers
    Ping,

    /// Show drain status of the daemon
    Status,
}
