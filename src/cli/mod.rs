//! CLI module for drainr - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for serving and for
//! talking to a running daemon.

pub mod commands;

pub use commands::Cli;
