//! Typed configuration for Harbor.
//!
//! [`HarborConfig`] groups four sections:
//!
//! - [`ServerSettings`] - bind host and port, TLS files, accept timing
//! - [`PoolSettings`] - worker count and stop bound
//! - [`RestartSettings`] - listener rebind backoff
//! - [`LoggingSettings`] - filter and output format
//!
//! [`ConfigLoader`] layers defaults, a TOML or JSON file and environment
//! variables, then validates the result.
//!
//! # Example
//!
//! ```no_run
//! use harbor_config::ConfigLoader;
//!
//! # fn main() -> Result<(), harbor_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("harbor.toml")?
//!     .with_env_prefix("HARBOR")
//!     .load()?;
//!
//! let server = config.to_server_config()?;
//! let logging = config.to_log_config()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 80
//! tls_cert = "/etc/harbor/cert.pem"
//! tls_key = "/etc/harbor/key.pem"
//! shutdown_timeout_ms = 3000
//! accept_poll_interval_ms = 50
//!
//! [pool]
//! size = 3
//! shutdown_timeout_ms = 3000
//!
//! [restart]
//! first_ms = 100
//! max_ms = 30000
//! factor = 2.0
//! degraded_after = 5
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Every key can be overridden as `HARBOR__SECTION__KEY`, for example
//! `HARBOR__SERVER__PORT=8080` or `HARBOR__LOGGING__LEVEL=debug`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::HarborConfig;
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{LoggingSettings, PoolSettings, RestartSettings, ServerSettings};

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
