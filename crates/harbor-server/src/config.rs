//! Server configuration types.
//!
//! Configuration is passed explicitly to the supervisor at construction,
//! using the builder pattern.
//!
//! # Example
//!
//! ```rust
//! use harbor_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .port(8080)
//!     .pool_size(4)
//!     .shutdown_timeout(Duration::from_secs(5))
//!     .build();
//!
//! assert_eq!(config.port(), 8080);
//! assert_eq!(config.pool_size(), 4);
//! ```

use std::time::Duration;

use harbor_tasks::{PoolConfig, TaskResult, DEFAULT_POOL_SIZE, DEFAULT_SHUTDOWN_TIMEOUT};

use crate::restart::RestartPolicy;
use crate::transport::{
    TcpTransport, TlsCredential, DEFAULT_ACCEPT_POLL_INTERVAL, DEFAULT_HOST,
};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 80;

/// Supervisor configuration.
///
/// Use [`ServerConfig::builder()`] to construct instances.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host.
    host: String,

    /// Listening port.
    port: u16,

    /// Optional TLS credential for accepted connections.
    tls: Option<TlsCredential>,

    /// Worker pool size, range-checked by the pool.
    pool_size: i64,

    /// Bound on joining the accept threads.
    shutdown_timeout: Duration,

    /// Bound on joining pool workers.
    pool_shutdown_timeout: Duration,

    /// Poll interval of the TCP accept loop.
    accept_poll_interval: Duration,

    /// Backoff between bind attempts.
    restart: RestartPolicy,
}

impl ServerConfig {
    /// Creates a new server configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Returns the bind host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the listening port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the TLS credential, if configured.
    #[must_use]
    pub fn tls(&self) -> Option<&TlsCredential> {
        self.tls.as_ref()
    }

    /// Returns the configured worker pool size.
    #[must_use]
    pub fn pool_size(&self) -> i64 {
        self.pool_size
    }

    /// Returns the accept-thread shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Returns the worker pool shutdown timeout.
    #[must_use]
    pub fn pool_shutdown_timeout(&self) -> Duration {
        self.pool_shutdown_timeout
    }

    /// Returns the accept poll interval.
    #[must_use]
    pub fn accept_poll_interval(&self) -> Duration {
        self.accept_poll_interval
    }

    /// Returns the restart policy.
    #[must_use]
    pub fn restart(&self) -> &RestartPolicy {
        &self.restart
    }

    /// A TCP transport bound to this config's host and poll interval.
    #[must_use]
    pub fn tcp_transport(&self) -> TcpTransport {
        TcpTransport::new(self.host.clone()).with_accept_poll_interval(self.accept_poll_interval)
    }

    /// Pool configuration derived from this config.
    pub fn pool_config(&self) -> TaskResult<PoolConfig> {
        Ok(PoolConfig::sized(self.pool_size)?.with_shutdown_timeout(self.pool_shutdown_timeout))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    host: String,
    port: u16,
    tls: Option<TlsCredential>,
    pool_size: i64,
    shutdown_timeout: Duration,
    pool_shutdown_timeout: Duration,
    accept_poll_interval: Duration,
    restart: RestartPolicy,
}

impl ServerConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls: None,
            pool_size: DEFAULT_POOL_SIZE as i64,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            pool_shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            accept_poll_interval: DEFAULT_ACCEPT_POLL_INTERVAL,
            restart: RestartPolicy::default(),
        }
    }

    /// Sets the bind host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the listening port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enables TLS with the given credential.
    #[must_use]
    pub fn tls(mut self, credential: TlsCredential) -> Self {
        self.tls = Some(credential);
        self
    }

    /// Sets the worker pool size. Checked when the supervisor is built.
    #[must_use]
    pub fn pool_size(mut self, size: i64) -> Self {
        self.pool_size = size;
        self
    }

    /// Sets how long `stop` waits for the accept threads.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets how long `stop` waits for pool workers.
    #[must_use]
    pub fn pool_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.pool_shutdown_timeout = timeout;
        self
    }

    /// Sets the TCP accept poll interval.
    #[must_use]
    pub fn accept_poll_interval(mut self, interval: Duration) -> Self {
        self.accept_poll_interval = interval;
        self
    }

    /// Sets the restart policy.
    #[must_use]
    pub fn restart(mut self, policy: RestartPolicy) -> Self {
        self.restart = policy;
        self
    }

    /// Builds the [`ServerConfig`].
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            tls: self.tls,
            pool_size: self.pool_size,
            shutdown_timeout: self.shutdown_timeout,
            pool_shutdown_timeout: self.pool_shutdown_timeout,
            accept_poll_interval: self.accept_poll_interval,
            restart: self.restart,
        }
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.host(), "0.0.0.0");
        assert_eq!(config.port(), 80);
        assert!(config.tls().is_none());
        assert_eq!(config.pool_size(), 3);
        assert_eq!(config.shutdown_timeout(), Duration::from_millis(3000));
        assert_eq!(config.pool_shutdown_timeout(), Duration::from_millis(3000));
        assert_eq!(config.accept_poll_interval(), Duration::from_millis(50));
        assert_eq!(config.restart(), &RestartPolicy::default());
    }

    #[test]
    fn test_builder_chaining() {
        let config = ServerConfig::builder()
            .host("127.0.0.1")
            .port(9090)
            .pool_size(8)
            .shutdown_timeout(Duration::from_secs(1))
            .pool_shutdown_timeout(Duration::from_secs(2))
            .accept_poll_interval(Duration::from_millis(5))
            .restart(RestartPolicy::constant(Duration::from_millis(1)))
            .build();

        assert_eq!(config.host(), "127.0.0.1");
        assert_eq!(config.port(), 9090);
        assert_eq!(config.pool_size(), 8);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(1));
        assert_eq!(config.pool_shutdown_timeout(), Duration::from_secs(2));
        assert_eq!(config.accept_poll_interval(), Duration::from_millis(5));
        assert_eq!(config.restart().max, Duration::from_millis(1));
    }

    #[test]
    fn test_pool_config() {
        let config = ServerConfig::builder()
            .pool_size(5)
            .pool_shutdown_timeout(Duration::from_millis(750))
            .build();
        let pool = config.pool_config().unwrap();

        assert_eq!(pool.size, 5);
        assert_eq!(pool.shutdown_timeout, Duration::from_millis(750));
    }

    #[test]
    fn test_tcp_transport() {
        let config = ServerConfig::builder().host("127.0.0.1").build();
        assert_eq!(config.tcp_transport().host(), "127.0.0.1");
    }

    #[test]
    fn test_pool_config_rejects_out_of_range() {
        for size in [-1, 33] {
            let config = ServerConfig::builder().pool_size(size).build();
            assert!(config.pool_config().is_err());
        }
    }
}
