//! Drain coordination for hijacked request handlers
//!
//! A listener's own shutdown stops accepting connections, but it cannot see
//! handlers that took over their connection. This module provides:
//! - `Coordinator`: counts tracked operations and signals quiescence
//! - `ActiveGuard`: RAII admission that always exits
//! - `TrackedHandler`: `RequestHandler` decorator that tracks each request
//! - `Deadline`: time and cancellation bounds for the drain wait
//! - `join_with_external_shutdown`: drain alongside a listener shutdown

pub mod coordinator;
pub mod deadline;
pub mod error;
pub mod guard;
pub mod join;
pub mod tracked;

pub use coordinator::Coordinator;
pub use deadline::Deadline;
pub use error::{BoxError, DrainError, ShutdownErrors};
pub use guard::ActiveGuard;
pub use join::join_with_external_shutdown;
pub use tracked::TrackedHandler;
