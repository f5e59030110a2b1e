//! Server error types.

use std::io;

use harbor_tasks::TaskError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors surfaced by supervisor and transport setup.
///
/// Bind failures inside the supervisor loop are retried, not returned; these
/// variants cover the operations a caller invokes directly.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The worker pool rejected its configuration or failed to start.
    #[error("worker pool error: {0}")]
    Pool(#[from] TaskError),

    /// A supervisor thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        /// Thread role.
        name: &'static str,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// TLS credential could not be loaded or assembled.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ServerError {
    /// Create a spawn error.
    pub fn spawn(name: &'static str, source: io::Error) -> Self {
        Self::Spawn { name, source }
    }

    /// Create a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }
}
