//! Drain outcomes and the aggregated shutdown error.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Boxed error from a shutdown procedure the coordinator knows nothing about.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Outcomes of tracked operations and drain waits that are not success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DrainError {
    /// A tracked operation was invoked after shutdown began
    #[error("Rejected: shutdown in progress")]
    Rejected,

    /// The deadline elapsed before every in-flight operation finished
    #[error("Deadline exceeded while draining in-flight operations")]
    DeadlineExceeded,

    /// The wait was cancelled through its cancellation token
    #[error("Drain wait cancelled")]
    Cancelled,
}

/// Failures from a joined shutdown: the coordinator drain and an external
/// shutdown procedure. Both are kept; neither overwrites the other.
#[derive(Debug, Default)]
pub struct ShutdownErrors {
    drain: Option<DrainError>,
    external: Option<BoxError>,
}

impl ShutdownErrors {
    /// Combine the two outcomes. `Ok(())` only when neither failed.
    pub fn from_results(
        drain: Result<(), DrainError>,
        external: Result<(), BoxError>,
    ) -> Result<(), Self> {
        let errors = Self {
            drain: drain.err(),
            external: external.err(),
        };
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Error from the coordinator drain, if it failed.
    pub fn drain_error(&self) -> Option<DrainError> {
        self.drain
    }

    /// Error from the external shutdown procedure, if it failed.
    pub fn external_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.external.as_deref()
    }

    /// Split into the individual failures.
    pub fn into_parts(self) -> (Option<DrainError>, Option<BoxError>) {
        (self.drain, self.external)
    }

    fn is_empty(&self) -> bool {
        self.drain.is_none() && self.external.is_none()
    }
}

impl fmt::Display for ShutdownErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.drain, &self.external) {
            (Some(drain), Some(external)) => {
                write!(f, "Shutdown failed: drain: {}; external: {}", drain, external)
            }
            (Some(drain), None) => write!(f, "Shutdown failed: drain: {}", drain),
            (None, Some(external)) => write!(f, "Shutdown failed: external: {}", external),
            (None, None) => write!(f, "Shutdown failed"),
        }
    }
}

impl StdError for ShutdownErrors {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match (&self.drain, &self.external) {
            (Some(drain), _) => Some(drain),
            (None, Some(external)) => Some(external.as_ref()),
            (None, None) => None,
        }
    }
}
