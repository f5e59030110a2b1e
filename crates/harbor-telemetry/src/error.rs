//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur while setting up logging.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The level or filter directive could not be parsed.
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    /// The output format name is unknown.
    #[error("Unknown log format: {0}")]
    UnknownFormat(String),

    /// A global subscriber could not be installed.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::LoggingInit("already set".to_string());
        assert_eq!(err.to_string(), "Failed to initialize logging: already set");
    }

    #[test]
    fn test_error_variants() {
        let _ = TelemetryError::InvalidFilter("info,,=".to_string());
        let _ = TelemetryError::UnknownFormat("xml".to_string());
    }
}
