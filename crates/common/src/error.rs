//! Common error types for the TURN balancer components.

use std::fmt;

/// A specialized Result type for balancer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Startup and wiring errors.
///
/// Routine runtime failures (a refused probe, a Prometheus timeout) never
/// become an `Error`; they are absorbed by the monitor that observed them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("Metrics backend error: {0}")]
    Metrics(String),

    #[error("Task failed: {0}")]
    Task(String),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new telemetry error.
    pub fn telemetry(msg: impl fmt::Display) -> Self {
        Error::Telemetry(msg.to_string())
    }

    /// Create a new metrics backend error.
    pub fn metrics(msg: impl fmt::Display) -> Self {
        Error::Metrics(msg.to_string())
    }

    /// Create a new error for a background task that stopped unexpectedly.
    pub fn task(msg: impl fmt::Display) -> Self {
        Error::Task(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::config("missing addressMapping").to_string(),
            "Configuration error: missing addressMapping"
        );
        assert_eq!(Error::telemetry("boom").to_string(), "Telemetry error: boom");
        assert_eq!(
            Error::metrics("prometheus section missing").to_string(),
            "Metrics backend error: prometheus section missing"
        );
        assert_eq!(
            Error::task("health probing for turn1 exited").to_string(),
            "Task failed: health probing for turn1 exited"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
