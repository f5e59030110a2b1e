//! Error types for pool and task operations.

use thiserror::Error;

/// Result type for pool operations.
pub type TaskResult<T> = Result<T, TaskError>;

/// Boxed error returned by a job action.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while configuring the pool or executing a task.
///
/// The `Failed` and `Panicked` variants are the failures captured on a
/// [`Task`](crate::Task) when its action raises; the remaining variants are
/// returned directly from pool operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The action returned an error.
    #[error("task failed: {0}")]
    Failed(String),

    /// The action panicked during execution.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// Invalid pool configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker: {0}")]
    SpawnFailed(String),
}

impl TaskError {
    /// Create a failed error.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    /// Create a panicked error.
    pub fn panicked(reason: impl Into<String>) -> Self {
        Self::Panicked(reason.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Create a spawn failed error.
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed(reason.into())
    }

    /// Check if the error was captured from a running action.
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Panicked(_))
    }

    /// Builds a [`TaskError::Panicked`] from a panic payload.
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Panicked(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let _ = TaskError::failed("io error");
        let _ = TaskError::panicked("assertion failed");
        let _ = TaskError::invalid_config("size out of range");
        let _ = TaskError::spawn_failed("resource exhausted");
    }

    #[test]
    fn test_is_execution_failure() {
        assert!(TaskError::failed("").is_execution_failure());
        assert!(TaskError::panicked("").is_execution_failure());
        assert!(!TaskError::invalid_config("").is_execution_failure());
        assert!(!TaskError::spawn_failed("").is_execution_failure());
    }

    #[test]
    fn test_from_panic_payloads() {
        let static_str: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(
            TaskError::from_panic(static_str.as_ref()),
            TaskError::Panicked("boom".to_string())
        );

        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(
            TaskError::from_panic(owned.as_ref()),
            TaskError::Panicked("kaboom".to_string())
        );

        let other: Box<dyn std::any::Any + Send> = Box::new(42_u8);
        assert!(matches!(
            TaskError::from_panic(other.as_ref()),
            TaskError::Panicked(_)
        ));
    }

    #[test]
    fn test_error_display() {
        let err = TaskError::invalid_config("pool size 33 exceeds 32");
        assert!(err.to_string().contains("33"));
    }
}
