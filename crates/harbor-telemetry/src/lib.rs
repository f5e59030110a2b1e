//! Logging setup for Harbor services.
//!
//! Harbor components log through `tracing` with structured fields such as
//! `task_id`, `worker`, `port` and `attempt`. This crate installs the
//! subscriber that renders those events:
//!
//! - **JSON** for production, one object per line
//! - **Pretty** or **compact** text for development
//!
//! Filtering uses `EnvFilter` directives, so per-crate levels such as
//! `harbor_server=debug,info` work.
//!
//! # Example
//!
//! ```rust,no_run
//! use harbor_telemetry::{init_logging, LogConfig, LogFormat};
//!
//! let config = LogConfig {
//!     level: "harbor_server=debug,info".to_string(),
//!     format: LogFormat::Compact,
//!     ..LogConfig::default()
//! };
//! init_logging(&config).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig, LogFormat};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
