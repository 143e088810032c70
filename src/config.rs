//! # Delayer Configuration System
//!
//! YAML-based configuration with explicit environment-variable overrides.
//! All values have working defaults so the daemon can start against a local
//! Redis with no config file at all; a file given via `DELAYER_CONFIG` must
//! exist and parse.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::constants::defaults;

/// Default config file looked up in the working directory when
/// `DELAYER_CONFIG` is not set.
pub const DEFAULT_CONFIG_FILE: &str = "delayer.yaml";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    FileRead { path: String, message: String },

    #[error("Invalid YAML in {path}: {message}")]
    InvalidYaml { path: String, message: String },

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Root configuration for the promotion daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct DelayerConfig {
    /// Redis connection and pooling settings
    pub redis: RedisConfig,

    /// Scheduler loop and pipeline concurrency settings
    pub timer: TimerConfig,
}

/// Redis connection and pooling configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RedisConfig {
    /// Full connection URL override; when set, host/port/password/database
    /// are ignored. Supports `${VAR}` expansion from the environment.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub password: String,
    pub database: i64,
    pub pool_size: usize,
    pub connect_timeout_ms: u64,
    pub wait_timeout_ms: u64,
    pub recycle_timeout_ms: u64,
    /// Deadline applied to each individual store command.
    pub operation_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: defaults::REDIS_HOST.to_string(),
            port: defaults::REDIS_PORT,
            password: String::new(),
            database: defaults::REDIS_DATABASE,
            pool_size: defaults::POOL_SIZE,
            connect_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
            wait_timeout_ms: defaults::WAIT_TIMEOUT_MS,
            recycle_timeout_ms: defaults::RECYCLE_TIMEOUT_MS,
            operation_timeout_ms: defaults::OPERATION_TIMEOUT_MS,
        }
    }
}

impl RedisConfig {
    /// Build the connection URL from components, honoring the explicit
    /// `url` override (with `${VAR}` expansion) when present.
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            if url.starts_with("${") && url.ends_with('}') {
                let var_name = &url[2..url.len() - 1];
                if let Ok(env_url) = env::var(var_name) {
                    return env_url;
                }
            } else if !url.is_empty() {
                return url.clone();
            }
        }

        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.database)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.password, self.host, self.port, self.database
            )
        }
    }

    /// Connection URL with any password masked, safe for logging.
    pub fn redacted_url(&self) -> String {
        redact_url(&self.connection_url())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn recycle_timeout(&self) -> Duration {
        Duration::from_millis(self.recycle_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// Scheduler loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimerConfig {
    /// Tick interval in milliseconds. Each tick starts one promotion pass.
    pub interval_ms: u64,
    /// Ceiling on concurrent topic lookups within one pass.
    pub max_concurrent_resolves: usize,
    /// Ceiling on concurrent per-topic moves within one pass.
    pub max_concurrent_moves: usize,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            interval_ms: defaults::TIMER_INTERVAL_MS,
            max_concurrent_resolves: defaults::MAX_CONCURRENT_RESOLVES,
            max_concurrent_moves: defaults::MAX_CONCURRENT_MOVES,
        }
    }
}

impl TimerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl DelayerConfig {
    /// Load configuration: `DELAYER_CONFIG` file if set, else `delayer.yaml`
    /// in the working directory if present, else defaults. Environment
    /// overrides are applied afterwards and the result is validated.
    pub fn load() -> ConfigResult<Self> {
        let mut config = match Self::config_file_path() {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration file");
                Self::from_yaml_file(&path)?
            }
            None => {
                debug!("No configuration file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;

        debug!(
            config = %serde_json::to_string(&config.sanitized())
                .unwrap_or_else(|_| "[serialization error]".to_string()),
            "Configuration loaded"
        );

        Ok(config)
    }

    fn config_file_path() -> Option<PathBuf> {
        if let Ok(path) = env::var("DELAYER_CONFIG") {
            return Some(PathBuf::from(path));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    }

    /// Parse configuration from a YAML file.
    pub fn from_yaml_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&content).map_err(|e| match e {
            ConfigError::InvalidYaml { message, .. } => ConfigError::InvalidYaml {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::InvalidYaml {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Apply `DELAYER_*` environment-variable overrides on top of the file
    /// values. Unparseable numeric values are ignored in favor of the
    /// existing setting.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("DELAYER_REDIS_URL") {
            if !url.is_empty() {
                self.redis.url = Some(url);
            }
        }
        if let Ok(host) = env::var("DELAYER_REDIS_HOST") {
            if !host.is_empty() {
                self.redis.host = host;
            }
        }
        if let Ok(port) = env::var("DELAYER_REDIS_PORT") {
            if let Ok(port) = port.parse() {
                self.redis.port = port;
            }
        }
        if let Ok(password) = env::var("DELAYER_REDIS_PASSWORD") {
            self.redis.password = password;
        }
        if let Ok(database) = env::var("DELAYER_REDIS_DATABASE") {
            if let Ok(database) = database.parse() {
                self.redis.database = database;
            }
        }
        if let Ok(interval) = env::var("DELAYER_TIMER_INTERVAL_MS") {
            if let Ok(interval) = interval.parse() {
                self.timer.interval_ms = interval;
            }
        }
    }

    /// Validate configuration for consistency and usable values.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.redis.url.is_none() && self.redis.host.is_empty() {
            return Err(ConfigError::invalid_value(
                "redis.host",
                "host must not be empty when no url is configured",
            ));
        }
        if self.redis.pool_size == 0 {
            return Err(ConfigError::invalid_value(
                "redis.pool_size",
                "pool size must be greater than 0",
            ));
        }
        if self.redis.database < 0 {
            return Err(ConfigError::invalid_value(
                "redis.database",
                "database index must not be negative",
            ));
        }
        if self.timer.interval_ms == 0 {
            return Err(ConfigError::invalid_value(
                "timer.interval_ms",
                "tick interval must be greater than 0",
            ));
        }
        if self.timer.max_concurrent_resolves == 0 {
            return Err(ConfigError::invalid_value(
                "timer.max_concurrent_resolves",
                "concurrency ceiling must be greater than 0",
            ));
        }
        if self.timer.max_concurrent_moves == 0 {
            return Err(ConfigError::invalid_value(
                "timer.max_concurrent_moves",
                "concurrency ceiling must be greater than 0",
            ));
        }
        Ok(())
    }

    /// JSON view of the configuration with credentials masked, for logging.
    pub fn sanitized(&self) -> serde_json::Value {
        let mut value = serde_json::json!(self);
        if let Some(redis) = value.get_mut("redis") {
            if let Some(password) = redis.get_mut("password") {
                if password.as_str().is_some_and(|p| !p.is_empty()) {
                    *password = serde_json::Value::String("[MASKED]".to_string());
                }
            }
            if let Some(url) = redis.get_mut("url") {
                if let Some(u) = url.as_str() {
                    *url = serde_json::Value::String(redact_url(u));
                }
            }
        }
        value
    }
}

/// Mask the password portion of a connection URL for safe logging.
pub(crate) fn redact_url(url: &str) -> String {
    if let Some(scheme_end) = url.find("://") {
        let after_scheme = &url[scheme_end + 3..];
        if let Some(at_pos) = after_scheme.find('@') {
            let credentials = &after_scheme[..at_pos];
            if let Some(colon_pos) = credentials.find(':') {
                return format!(
                    "{}://{}:****@{}",
                    &url[..scheme_end],
                    &credentials[..colon_pos],
                    &after_scheme[at_pos + 1..]
                );
            }
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = DelayerConfig::default();
        assert_eq!(config.redis.host, "127.0.0.1");
        assert_eq!(config.redis.port, 6379);
        assert_eq!(config.redis.pool_size, 10);
        assert_eq!(config.timer.interval_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = DelayerConfig::from_yaml_str(
            r#"
redis:
  host: "10.0.0.5"
timer:
  interval_ms: 500
"#,
        )
        .unwrap();

        assert_eq!(config.redis.host, "10.0.0.5");
        assert_eq!(config.redis.port, 6379);
        assert_eq!(config.timer.interval_ms, 500);
        assert_eq!(
            config.timer.max_concurrent_resolves,
            defaults::MAX_CONCURRENT_RESOLVES
        );
    }

    #[test]
    fn test_yaml_file_loading() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("delayer.yaml");
        fs::write(
            &path,
            r#"
redis:
  host: "redis.internal"
  port: 6380
  password: "hunter2"
  database: 3
  pool_size: 4
timer:
  interval_ms: 250
  max_concurrent_resolves: 8
  max_concurrent_moves: 2
"#,
        )
        .unwrap();

        let config = DelayerConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.redis.host, "redis.internal");
        assert_eq!(config.redis.port, 6380);
        assert_eq!(config.redis.database, 3);
        assert_eq!(config.timer.max_concurrent_moves, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_error() {
        let result = DelayerConfig::from_yaml_file(Path::new("/nonexistent/delayer.yaml"));
        assert!(matches!(result, Err(ConfigError::FileRead { .. })));
    }

    #[test]
    fn test_invalid_yaml_error() {
        let result = DelayerConfig::from_yaml_str("redis: [not, a, mapping");
        assert!(matches!(result, Err(ConfigError::InvalidYaml { .. })));
    }

    #[test]
    fn test_connection_url_assembly() {
        let mut config = RedisConfig::default();
        assert_eq!(config.connection_url(), "redis://127.0.0.1:6379/0");

        config.password = "secret".to_string();
        config.database = 2;
        assert_eq!(config.connection_url(), "redis://:secret@127.0.0.1:6379/2");

        config.url = Some("redis://explicit:6400/1".to_string());
        assert_eq!(config.connection_url(), "redis://explicit:6400/1");
    }

    #[test]
    fn test_redacted_url_masks_password() {
        let mut config = RedisConfig {
            password: "hunter2".to_string(),
            ..RedisConfig::default()
        };
        assert_eq!(config.redacted_url(), "redis://:****@127.0.0.1:6379/0");

        // No credentials, nothing to mask.
        config.password = String::new();
        assert_eq!(config.redacted_url(), "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn test_validation_errors() {
        let mut config = DelayerConfig::default();
        config.timer.interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "timer.interval_ms")
        );

        let mut config = DelayerConfig::default();
        config.redis.pool_size = 0;
        assert!(config.validate().is_err());

        let mut config = DelayerConfig::default();
        config.redis.host = String::new();
        assert!(config.validate().is_err());

        // An explicit URL makes the empty host acceptable.
        config.redis.url = Some("redis://somewhere:6379/0".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("DELAYER_REDIS_HOST", "env-host");
        env::set_var("DELAYER_REDIS_PORT", "7000");
        env::set_var("DELAYER_TIMER_INTERVAL_MS", "not-a-number");

        let mut config = DelayerConfig::default();
        config.apply_env_overrides();

        env::remove_var("DELAYER_REDIS_HOST");
        env::remove_var("DELAYER_REDIS_PORT");
        env::remove_var("DELAYER_TIMER_INTERVAL_MS");

        assert_eq!(config.redis.host, "env-host");
        assert_eq!(config.redis.port, 7000);
        // Unparseable override keeps the existing value.
        assert_eq!(config.timer.interval_ms, defaults::TIMER_INTERVAL_MS);
    }

    #[test]
    fn test_sanitized_masks_password() {
        let mut config = DelayerConfig::default();
        config.redis.password = "super-secret".to_string();

        let sanitized = config.sanitized();
        assert_eq!(
            sanitized["redis"]["password"],
            serde_json::json!("[MASKED]")
        );
        assert_eq!(sanitized["redis"]["host"], serde_json::json!("127.0.0.1"));
        // Original config is untouched.
        assert_eq!(config.redis.password, "super-secret");
    }

    #[test]
    fn test_duration_helpers() {
        let config = DelayerConfig::default();
        assert_eq!(config.timer.interval(), Duration::from_millis(1000));
        assert_eq!(
            config.redis.operation_timeout(),
            Duration::from_millis(defaults::OPERATION_TIMEOUT_MS)
        );
    }
}
