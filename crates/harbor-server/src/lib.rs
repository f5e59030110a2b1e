//! # Harbor Server
//!
//! Connection supervision for the Harbor runtime.
//!
//! This crate provides:
//!
//! - **Transports**: [`Transport`], [`Listener`] and [`Connection`] traits,
//!   with a TCP implementation and optional TLS via `rustls`
//! - **Handlers**: the [`ConnectionHandler`] capability, called once per
//!   accepted connection
//! - **Supervisor**: keeps a listener alive, restarts it with backoff, and
//!   dispatches connections onto a [`WorkerPool`](harbor_tasks::WorkerPool)
//!
//! ## Example
//!
//! ```rust,no_run
//! use harbor_server::prelude::*;
//! use std::io::Write;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .host("127.0.0.1")
//!     .port(8080)
//!     .pool_size(3)
//!     .restart(RestartPolicy::default())
//!     .build();
//!
//! let transport = config.tcp_transport();
//! let supervisor = Supervisor::new(config, transport, |conn: &mut TcpConnection| {
//!     conn.write_all(b"HTTP/1.1 204 No Content\r\n\r\n")?;
//!     Ok::<_, HandlerError>(())
//! })
//! .unwrap();
//!
//! supervisor.start().unwrap();
//! std::thread::sleep(Duration::from_secs(1));
//! assert_eq!(supervisor.state(), SupervisorState::Serving);
//!
//! supervisor.stop();
//! ```
//!
//! ## Shutdown
//!
//! `stop` cancels the supervisor, stops the listener and joins the accept
//! threads, then stops the pool. Each join is bounded; a thread that misses
//! its deadline is detached and counted in
//! [`ShutdownReport::abandoned`](harbor_tasks::ShutdownReport::abandoned).
//! Threads are never killed, so a detached thread finishes its current job
//! and exits on its own.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod error;
mod handler;
mod restart;
mod supervisor;
mod transport;

pub use config::{ServerConfig, ServerConfigBuilder, DEFAULT_PORT};
pub use error::{ServerError, ServerResult};
pub use handler::{ConnectionHandler, HandlerError};
pub use restart::{
    RestartPolicy, DEFAULT_DEGRADED_AFTER, DEFAULT_RESTART_FACTOR, DEFAULT_RESTART_FIRST,
    DEFAULT_RESTART_MAX,
};
pub use supervisor::{Supervisor, SupervisorState, TransportConnection};
pub use transport::{
    Connection, Listener, TcpAcceptor, TcpConnection, TcpTransport, TlsCredential, Transport,
    DEFAULT_ACCEPT_POLL_INTERVAL, DEFAULT_HOST,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{ServerConfig, ServerConfigBuilder};
    pub use crate::error::{ServerError, ServerResult};
    pub use crate::handler::{ConnectionHandler, HandlerError};
    pub use crate::restart::RestartPolicy;
    pub use crate::supervisor::{Supervisor, SupervisorState};
    pub use crate::transport::{
        Connection, Listener, TcpConnection, TcpTransport, TlsCredential, Transport,
    };
}
