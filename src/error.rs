//! Error types for drainr
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::drain::{DrainError, ShutdownErrors};

/// All error types that can occur in drainr
#[derive(Debug, Error)]
pub enum DrainrError {
    /// IPC communication error
    #[error("IPC error: {0}")]
    Ipc(String),

    /// Tracked operation rejected or drain wait failed
    #[error("Drain error: {0}")]
    Drain(#[from] DrainError),

    /// Drain and listener shutdown, with every failure kept
    #[error(transparent)]
    Shutdown(#[from] ShutdownErrors),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for drainr operations
pub type Result<T> = std::result::Result<T, DrainrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipc_error() {
        let err = DrainrError::Ipc("socket closed".to_string());
        assert_eq!(err.to_string(), "IPC error: socket closed");
    }

    #[test]
    fn test_drain_error_conversion() {
        let err: DrainrError = DrainError::DeadlineExceeded.into();
        assert!(matches!(err, DrainrError::Drain(DrainError::DeadlineExceeded)));
        assert!(err.to_string().starts_with("Drain error: "));
    }

    #[test]
    fn test_shutdown_errors_conversion() {
        let errors =
            ShutdownErrors::from_results(Err(DrainError::Cancelled), Ok(())).unwrap_err();
        let err: DrainrError = errors.into();
        assert!(matches!(err, DrainrError::Shutdown(_)));
        assert!(err.to_string().contains("Drain wait cancelled"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DrainrError = io_err.into();
        assert!(matches!(err, DrainrError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: DrainrError = json_err.into();
        assert!(matches!(err, DrainrError::Json(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(DrainrError::Drain(DrainError::Rejected))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
