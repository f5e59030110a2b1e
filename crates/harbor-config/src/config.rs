//! Root configuration type.

use std::time::Duration;

use harbor_server::{RestartPolicy, ServerConfig, TlsCredential};
use harbor_tasks::MAX_POOL_SIZE;
use harbor_telemetry::{create_env_filter, LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::schema::{LoggingSettings, PoolSettings, RestartSettings, ServerSettings};
use crate::ConfigResult;

/// Complete Harbor configuration.
///
/// # Example
///
/// ```
/// use harbor_config::HarborConfig;
///
/// let config = HarborConfig::default();
/// assert!(config.validate().is_ok());
/// assert_eq!(config.pool.size, 3);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HarborConfig {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Worker pool settings.
    #[serde(default)]
    pub pool: PoolSettings,

    /// Listener restart backoff.
    #[serde(default)]
    pub restart: RestartSettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl HarborConfig {
    /// Pretty debug logging with file and line info.
    #[must_use]
    pub fn development() -> Self {
        Self {
            logging: LoggingSettings {
                level: "debug".to_string(),
                format: "pretty".to_string(),
                file_line_info: true,
                ..LoggingSettings::default()
            },
            ..Self::default()
        }
    }

    /// Validates the configuration.
    ///
    /// Checks that the pool size is within `0..=32`, the port is non-zero,
    /// timeouts are non-zero, TLS paths are set together, the restart
    /// backoff is sane and the log level and format parse.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.port == 0 {
            return Err(ConfigError::invalid_value("server.port", "must not be 0"));
        }

        if self.server.host.trim().is_empty() {
            return Err(ConfigError::invalid_value("server.host", "must not be empty"));
        }

        match (&self.server.tls_cert, &self.server.tls_key) {
            (Some(_), None) => {
                return Err(ConfigError::invalid_value(
                    "server.tls_key",
                    "required when server.tls_cert is set",
                ))
            }
            (None, Some(_)) => {
                return Err(ConfigError::invalid_value(
                    "server.tls_cert",
                    "required when server.tls_key is set",
                ))
            }
            _ => {}
        }

        for (field, value) in [
            ("server.shutdown_timeout_ms", self.server.shutdown_timeout_ms),
            ("server.accept_poll_interval_ms", self.server.accept_poll_interval_ms),
            ("pool.shutdown_timeout_ms", self.pool.shutdown_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid_value(field, "must be greater than 0"));
            }
        }

        if self.pool.size < 0 || self.pool.size > MAX_POOL_SIZE as i64 {
            return Err(ConfigError::invalid_value(
                "pool.size",
                format!("must be between 0 and {MAX_POOL_SIZE}, got {}", self.pool.size),
            ));
        }

        if self.restart.first_ms == 0 {
            return Err(ConfigError::invalid_value("restart.first_ms", "must be greater than 0"));
        }
        if self.restart.max_ms < self.restart.first_ms {
            return Err(ConfigError::invalid_value(
                "restart.max_ms",
                "must not be less than restart.first_ms",
            ));
        }
        if !self.restart.factor.is_finite() || self.restart.factor < 1.0 {
            return Err(ConfigError::invalid_value(
                "restart.factor",
                "must be a finite number of at least 1.0",
            ));
        }
        if self.restart.degraded_after == 0 {
            return Err(ConfigError::invalid_value(
                "restart.degraded_after",
                "must be greater than 0",
            ));
        }

        create_env_filter(&self.logging.level)
            .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;
        self.log_format()?;

        Ok(())
    }

    /// Restart policy described by the `restart` section.
    #[must_use]
    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy {
            first: Duration::from_millis(self.restart.first_ms),
            max: Duration::from_millis(self.restart.max_ms),
            factor: self.restart.factor,
            degraded_after: self.restart.degraded_after,
        }
    }

    /// Builds the supervisor configuration, loading TLS material if set.
    pub fn to_server_config(&self) -> ConfigResult<ServerConfig> {
        let mut builder = ServerConfig::builder()
            .host(self.server.host.clone())
            .port(self.server.port)
            .pool_size(self.pool.size)
            .shutdown_timeout(Duration::from_millis(self.server.shutdown_timeout_ms))
            .pool_shutdown_timeout(Duration::from_millis(self.pool.shutdown_timeout_ms))
            .accept_poll_interval(Duration::from_millis(self.server.accept_poll_interval_ms))
            .restart(self.restart_policy());

        if let (Some(cert), Some(key)) = (&self.server.tls_cert, &self.server.tls_key) {
            let credential = TlsCredential::from_pem_files(cert, key)
                .map_err(|e| ConfigError::invalid_value("server.tls_cert", e.to_string()))?;
            builder = builder.tls(credential);
        }

        Ok(builder.build())
    }

    /// Builds the logging configuration.
    pub fn to_log_config(&self) -> ConfigResult<LogConfig> {
        Ok(LogConfig {
            enabled: self.logging.enabled,
            level: self.logging.level.clone(),
            format: self.log_format()?,
            file_line_info: self.logging.file_line_info,
            thread_names: self.logging.thread_names,
            include_target: self.logging.include_target,
        })
    }

    fn log_format(&self) -> ConfigResult<LogFormat> {
        self.logging.format.parse().map_err(|_| {
            ConfigError::invalid_value("logging.format", "expected 'json', 'pretty' or 'compact'")
        })
    }
}
