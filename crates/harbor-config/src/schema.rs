//! Configuration schema types.
//!
//! Every field has a default, so a file only needs the keys it changes.
//! Unknown keys are rejected.

use harbor_server::{
    DEFAULT_ACCEPT_POLL_INTERVAL, DEFAULT_DEGRADED_AFTER, DEFAULT_HOST, DEFAULT_PORT,
    DEFAULT_RESTART_FACTOR, DEFAULT_RESTART_FIRST, DEFAULT_RESTART_MAX,
};
use harbor_tasks::{DEFAULT_POOL_SIZE, DEFAULT_SHUTDOWN_TIMEOUT};
use serde::{Deserialize, Serialize};

/// Listener section.
///
/// # Example
///
/// ```
/// use harbor_config::ServerSettings;
///
/// let server = ServerSettings::default();
/// assert_eq!(server.port, 80);
/// assert!(server.tls_cert.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Listening port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// PEM certificate chain. Set together with `tls_key`.
    #[serde(default)]
    pub tls_cert: Option<String>,

    /// PEM private key. Set together with `tls_cert`.
    #[serde(default)]
    pub tls_key: Option<String>,

    /// Bound on joining the accept threads, in milliseconds.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Accept loop poll interval, in milliseconds.
    #[serde(default = "default_accept_poll_interval_ms")]
    pub accept_poll_interval_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tls_cert: None,
            tls_key: None,
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            accept_poll_interval_ms: default_accept_poll_interval_ms(),
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT.as_millis() as u64
}

fn default_accept_poll_interval_ms() -> u64 {
    DEFAULT_ACCEPT_POLL_INTERVAL.as_millis() as u64
}

/// Worker pool section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PoolSettings {
    /// Number of workers. Signed so that negative values reach validation
    /// instead of failing to parse.
    #[serde(default = "default_pool_size")]
    pub size: i64,

    /// Bound on joining workers at stop, in milliseconds.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

fn default_pool_size() -> i64 {
    DEFAULT_POOL_SIZE as i64
}

/// Listener restart backoff section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RestartSettings {
    /// Delay after the first bind failure, in milliseconds.
    #[serde(default = "default_first_ms")]
    pub first_ms: u64,

    /// Upper bound on the delay, in milliseconds.
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,

    /// Growth factor per consecutive failure.
    #[serde(default = "default_factor")]
    pub factor: f64,

    /// Consecutive failures before the supervisor reports degraded.
    #[serde(default = "default_degraded_after")]
    pub degraded_after: u32,
}

impl Default for RestartSettings {
    fn default() -> Self {
        Self {
            first_ms: default_first_ms(),
            max_ms: default_max_ms(),
            factor: default_factor(),
            degraded_after: default_degraded_after(),
        }
    }
}

fn default_first_ms() -> u64 {
    DEFAULT_RESTART_FIRST.as_millis() as u64
}

fn default_max_ms() -> u64 {
    DEFAULT_RESTART_MAX.as_millis() as u64
}

fn default_factor() -> f64 {
    DEFAULT_RESTART_FACTOR
}

fn default_degraded_after() -> u32 {
    DEFAULT_DEGRADED_AFTER
}

/// Logging section.
///
/// `format` is one of `json`, `pretty` or `compact`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// Whether logging is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive.
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format.
    #[serde(default = "default_format")]
    pub format: String,

    /// Include file and line.
    #[serde(default)]
    pub file_line_info: bool,

    /// Include thread names.
    #[serde(default = "default_true")]
    pub thread_names: bool,

    /// Include the event target.
    #[serde(default = "default_true")]
    pub include_target: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_level(),
            format: default_format(),
            file_line_info: false,
            thread_names: true,
            include_target: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "json".to_string()
}
