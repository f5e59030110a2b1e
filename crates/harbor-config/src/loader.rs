//! Layered configuration loading.
//!
//! Later layers override earlier ones:
//! 1. Built-in defaults
//! 2. A TOML or JSON file
//! 3. Environment variables (optionally seeded from `.env`)

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::{ConfigResult, HarborConfig};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "HARBOR";

/// Configuration loader with layered approach.
///
/// # Example
///
/// ```no_run
/// use harbor_config::ConfigLoader;
///
/// # fn main() -> Result<(), harbor_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_optional_file("/etc/harbor/harbor.toml")?
///     .with_dotenv()?
///     .with_env_prefix("HARBOR")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: HarborConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new loader holding the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: HarborConfig::default(),
            env_prefix: None,
        }
    }

    /// Reset to default values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = HarborConfig::default();
        self
    }

    /// Start from the development preset.
    ///
    /// ```
    /// use harbor_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.format, "pretty");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = HarborConfig::development();
        self
    }

    /// Load a `.toml` or `.json` file, chosen by extension.
    ///
    /// Keys missing from the file take their defaults.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if !matches!(extension.as_str(), "toml" | "json") {
            return Err(ConfigError::UnsupportedFormat(path.display().to_string()));
        }

        self.config = parse(&content, &extension)?;
        Ok(self)
    }

    /// Like [`with_file`](Self::with_file), but a missing file is skipped.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> ConfigResult<Self> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format (`toml` or `json`).
    ///
    /// ```
    /// use harbor_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[server]\nport = 8080", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.port, 8080);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> ConfigResult<Self> {
        self.config = parse(content, &format.to_lowercase())?;
        Ok(self)
    }

    /// Apply `PREFIX__SECTION__KEY` environment variables on load.
    ///
    /// With prefix `HARBOR`, `HARBOR__POOL__SIZE=4` sets `pool.size`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load variables from a `.env` file in the working directory or its
    /// parents. A missing file is not an error.
    pub fn with_dotenv(self) -> ConfigResult<Self> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::Dotenv(e.to_string())),
        }
    }

    /// Apply environment overrides and validate.
    pub fn load(self) -> ConfigResult<HarborConfig> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides without validating.
    pub fn load_unvalidated(mut self) -> ConfigResult<HarborConfig> {
        if let Some(prefix) = self.env_prefix.take() {
            let vars: Vec<(String, String)> = env::vars()
                .filter(|(k, _)| k.starts_with(&format!("{prefix}__")))
                .collect();
            for (key, value) in vars {
                self.apply_env_var(&key, &value, &prefix)?;
            }
        }
        Ok(self.config)
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> ConfigResult<()> {
        let rest = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;
        let parts: Vec<&str> = rest.split("__").collect();

        let config = &mut self.config;
        match parts.as_slice() {
            ["SERVER", "HOST"] => config.server.host = value.to_string(),
            ["SERVER", "PORT"] => config.server.port = parse_num(key, value)?,
            ["SERVER", "TLS_CERT"] => config.server.tls_cert = optional(value),
            ["SERVER", "TLS_KEY"] => config.server.tls_key = optional(value),
            ["SERVER", "SHUTDOWN_TIMEOUT_MS"] => {
                config.server.shutdown_timeout_ms = parse_num(key, value)?;
            }
            ["SERVER", "ACCEPT_POLL_INTERVAL_MS"] => {
                config.server.accept_poll_interval_ms = parse_num(key, value)?;
            }

            ["POOL", "SIZE"] => config.pool.size = parse_num(key, value)?,
            ["POOL", "SHUTDOWN_TIMEOUT_MS"] => {
                config.pool.shutdown_timeout_ms = parse_num(key, value)?;
            }

            ["RESTART", "FIRST_MS"] => config.restart.first_ms = parse_num(key, value)?,
            ["RESTART", "MAX_MS"] => config.restart.max_ms = parse_num(key, value)?,
            ["RESTART", "FACTOR"] => config.restart.factor = parse_num(key, value)?,
            ["RESTART", "DEGRADED_AFTER"] => {
                config.restart.degraded_after = parse_num(key, value)?;
            }

            ["LOGGING", "ENABLED"] => config.logging.enabled = parse_flag(key, value)?,
            ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => config.logging.format = value.to_lowercase(),
            ["LOGGING", "FILE_LINE_INFO"] => {
                config.logging.file_line_info = parse_flag(key, value)?;
            }
            ["LOGGING", "THREAD_NAMES"] => config.logging.thread_names = parse_flag(key, value)?,
            ["LOGGING", "INCLUDE_TARGET"] => {
                config.logging.include_target = parse_flag(key, value)?;
            }

            _ => return Err(ConfigError::env_parse_error(key, "unknown configuration key")),
        }

        Ok(())
    }
}

fn parse(content: &str, format: &str) -> ConfigResult<HarborConfig> {
    match format {
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, format!("expected a number, got {value:?}")))
}

fn parse_flag(key: &str, value: &str) -> ConfigResult<bool> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, HarborConfig::default());
    }

    #[test]
    fn test_loader_with_string_toml() {
        let toml = r#"
            [server]
            host = "127.0.0.1"
            port = 8443

            [pool]
            size = 6
        "#;

        let config = ConfigLoader::new()
            .with_string(toml, "toml")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8443);
        assert_eq!(config.pool.size, 6);
        assert_eq!(config.restart.first_ms, 100);
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"restart": {"first_ms": 250, "degraded_after": 2}}"#;
        let config = ConfigLoader::new()
            .with_string(json, "JSON")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.restart.first_ms, 250);
        assert_eq!(config.restart.degraded_after, 2);
    }

    #[test]
    fn test_loader_unsupported_format() {
        let result = ConfigLoader::new().with_string("port: 80", "yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(f)) if f == "yaml"));
    }

    #[test]
    fn test_loader_unknown_section() {
        let result = ConfigLoader::new().with_string("[telemetry]\nenabled = true", "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_loader_with_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[logging]\nlevel = \"warn\"\nformat = \"compact\"").unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, "compact");
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/harbor.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/harbor.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.server.port, 80);
    }

    #[test]
    fn test_loader_rejects_invalid_values() {
        let result = ConfigLoader::new()
            .with_string("[pool]\nsize = 40", "toml")
            .unwrap()
            .load();
        assert!(matches!(result, Err(ConfigError::InvalidValue { field, .. }) if field == "pool.size"));
    }

    #[test]
    fn test_load_unvalidated() {
        let config = ConfigLoader::new()
            .with_string("[pool]\nsize = -4", "toml")
            .unwrap()
            .load_unvalidated()
            .unwrap();
        assert_eq!(config.pool.size, -4);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_bool() {
        for s in ["true", "TRUE", "1", "yes", "on"] {
            assert_eq!(parse_bool(s), Some(true), "{s}");
        }
        for s in ["false", "False", "0", "no", "off"] {
            assert_eq!(parse_bool(s), Some(false), "{s}");
        }
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    // Overrides go through apply_env_var so tests never touch the process
    // environment.

    #[test]
    fn test_apply_env_var_server() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__SERVER__PORT", "8080", "TEST").unwrap();
        loader.apply_env_var("TEST__SERVER__HOST", "10.0.0.2", "TEST").unwrap();
        loader.apply_env_var("TEST__SERVER__TLS_CERT", "/etc/harbor/cert.pem", "TEST").unwrap();
        assert_eq!(loader.config.server.port, 8080);
        assert_eq!(loader.config.server.host, "10.0.0.2");
        assert_eq!(loader.config.server.tls_cert.as_deref(), Some("/etc/harbor/cert.pem"));

        loader.apply_env_var("TEST__SERVER__TLS_CERT", "", "TEST").unwrap();
        assert!(loader.config.server.tls_cert.is_none());
    }

    #[test]
    fn test_apply_env_var_pool_and_restart() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__POOL__SIZE", "-1", "TEST").unwrap();
        loader.apply_env_var("TEST__RESTART__FACTOR", "1.5", "TEST").unwrap();
        loader.apply_env_var("TEST__RESTART__MAX_MS", "5000", "TEST").unwrap();
        assert_eq!(loader.config.pool.size, -1);
        assert!((loader.config.restart.factor - 1.5).abs() < f64::EPSILON);
        assert_eq!(loader.config.restart.max_ms, 5000);
    }

    #[test]
    fn test_apply_env_var_logging() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__LOGGING__FORMAT", "Pretty", "TEST").unwrap();
        loader.apply_env_var("TEST__LOGGING__ENABLED", "off", "TEST").unwrap();
        assert_eq!(loader.config.logging.format, "pretty");
        assert!(!loader.config.logging.enabled);
    }

    #[test]
    fn test_apply_env_var_invalid() {
        let mut loader = ConfigLoader::new();
        assert!(loader.apply_env_var("TEST__SERVER__PORT", "eighty", "TEST").is_err());
        assert!(loader.apply_env_var("TEST__SERVER__PORT", "70000", "TEST").is_err());
        assert!(loader.apply_env_var("TEST__LOGGING__ENABLED", "maybe", "TEST").is_err());
        assert!(loader.apply_env_var("TEST__POOL__THREADS", "4", "TEST").is_err());
        assert!(loader.apply_env_var("OTHER__POOL__SIZE", "4", "TEST").is_err());
    }
}
