//! # Harbor
//!
//! Keeps a network listener alive on a small device and serves every
//! accepted connection on a fixed pool of worker threads.
//!
//! - [`tasks`]: the worker pool, tasks and cancellation
//! - [`server`]: transports, the connection handler capability and the
//!   listener supervisor
//! - [`config`]: layered configuration loading
//! - [`telemetry`]: logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use harbor::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().with_env_prefix("HARBOR").load()?;
//! init_logging(&config.to_log_config()?)?;
//!
//! let server_config = config.to_server_config()?;
//! let transport = server_config.tcp_transport();
//! let supervisor = Supervisor::new(server_config, transport, harbor::no_content)?;
//! supervisor.start()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Transport::bind ──► Listener::accept ──► WorkerPool::submit ──► ConnectionHandler
//!       ▲                    │
//!       └── RestartPolicy ◄──┘ (bind or accept failure)
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod service;

pub use harbor_config as config;
pub use harbor_server as server;
pub use harbor_tasks as tasks;
pub use harbor_telemetry as telemetry;

pub use service::{no_content, read_request_head, NO_CONTENT_RESPONSE, REQUEST_READ_TIMEOUT};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use harbor_config::{ConfigError, ConfigLoader, HarborConfig};
    pub use harbor_server::prelude::*;
    pub use harbor_tasks::prelude::*;
    pub use harbor_telemetry::{init_logging, LogConfig, LogFormat};
}
