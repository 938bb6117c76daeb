use crate::dialer::DEFAULT_PIPE_PATH;
use crate::errors::{PipeProbeError, Result};
use crate::http_client::DEFAULT_MAX_BODY_BYTES;
use crate::probe::{DEFAULT_METHOD, DEFAULT_REQUEST_PATH};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Log levels accepted in configuration, quietest first
pub const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Configuration for pipe-probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProbeConfig {
    /// Where and what to request
    pub target: TargetConfig,
    /// Request execution limits
    pub client: ClientConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Request target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Named pipe (Windows) or Unix socket path
    pub pipe_path: String,
    /// Request path appended to the synthetic host
    pub request_path: String,
    /// HTTP method
    pub method: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            pipe_path: DEFAULT_PIPE_PATH.to_string(),
            request_path: DEFAULT_REQUEST_PATH.to_string(),
            method: DEFAULT_METHOD.to_string(),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Bound on the whole exchange: dial, send, receive, body read
    pub timeout_ms: u64,
    /// Largest response body read into memory
    pub max_body_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base log level (trace, debug, info, warn, error), shifted by `-v`
    pub level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub structured: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            structured: false,
        }
    }
}

impl ProbeConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipeProbeError::configuration(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            PipeProbeError::configuration(format!("Failed to parse TOML config: {}", e))
        })
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipeProbeError::configuration(format!("Failed to read config file: {}", e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            PipeProbeError::configuration(format!("Failed to parse JSON config: {}", e))
        })
    }

    /// Load a `.json` file as JSON and anything else as TOML
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let is_json = path
            .as_ref()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_file(path)
        } else {
            Self::from_toml_file(path)
        }
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source
    ///
    /// Unparseable numeric values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(pipe) = lookup("PIPE_PROBE_PIPE") {
            self.target.pipe_path = pipe;
        }

        if let Some(path) = lookup("PIPE_PROBE_PATH") {
            self.target.request_path = path;
        }

        if let Some(method) = lookup("PIPE_PROBE_METHOD") {
            self.target.method = method;
        }

        if let Some(timeout) = lookup("PIPE_PROBE_TIMEOUT_MS") {
            if let Ok(timeout_ms) = timeout.parse::<u64>() {
                self.client.timeout_ms = timeout_ms;
            }
        }

        if let Some(limit) = lookup("PIPE_PROBE_MAX_BODY_BYTES") {
            if let Ok(bytes) = limit.parse::<usize>() {
                self.client.max_body_bytes = bytes;
            }
        }

        if let Some(level) = lookup("PIPE_PROBE_LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
    }

    /// Convert client timeout to Duration
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.client.timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.target.pipe_path.is_empty() {
            return Err(PipeProbeError::configuration("Pipe path cannot be empty"));
        }

        if self.client.timeout_ms == 0 {
            return Err(PipeProbeError::configuration("Timeout cannot be zero"));
        }

        if self.client.max_body_bytes == 0 {
            return Err(PipeProbeError::configuration(
                "Body size limit cannot be zero",
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(PipeProbeError::configuration(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }
}

/// Configuration builder for fluent configuration setup
pub struct ConfigBuilder {
    config: ProbeConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ProbeConfig::default(),
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: ProbeConfig) -> Self {
        Self { config }
    }

    pub fn pipe_path<S: Into<String>>(mut self, path: S) -> Self {
        self.config.target.pipe_path = path.into();
        self
    }

    pub fn request_path<S: Into<String>>(mut self, path: S) -> Self {
        self.config.target.request_path = path.into();
        self
    }

    pub fn method<S: Into<String>>(mut self, method: S) -> Self {
        self.config.target.method = method.into();
        self
    }

    /// Set the exchange timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.client.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub const fn max_body_bytes(mut self, limit: usize) -> Self {
        self.config.client.max_body_bytes = limit;
        self
    }

    /// Set the base log level
    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub const fn structured_logging(mut self, enabled: bool) -> Self {
        self.config.logging.structured = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ProbeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use std::collections::HashMap;

    fn scratch_file(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "pipe-probe-{}-{}-{}",
            std::process::id(),
            rand::random::<u32>(),
            name
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ProbeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.target.pipe_path, DEFAULT_PIPE_PATH);
        assert_eq!(config.target.request_path, "/info");
        assert_eq!(config.target.method, "GET");
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ProbeConfig::default();
        config.client.timeout_ms = 0;
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::Configuration);

        let mut config = ProbeConfig::default();
        config.target.pipe_path.clear();
        assert!(config.validate().is_err());

        let mut config = ProbeConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = ProbeConfig::default();
        config.client.max_body_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .pipe_path("/run/podman/podman.sock")
            .request_path("/_ping")
            .method("HEAD")
            .timeout(Duration::from_millis(1500))
            .log_level("debug")
            .structured_logging(true)
            .build()
            .unwrap();

        assert_eq!(config.target.pipe_path, "/run/podman/podman.sock");
        assert_eq!(config.target.request_path, "/_ping");
        assert_eq!(config.target.method, "HEAD");
        assert_eq!(config.client.timeout_ms, 1500);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.structured);

        assert!(ConfigBuilder::new().timeout(Duration::ZERO).build().is_err());
    }

    #[test]
    fn test_oversized_timeout_saturates() {
        let config = ConfigBuilder::new().timeout(Duration::MAX).build().unwrap();
        assert_eq!(config.client.timeout_ms, u64::MAX);
        assert_eq!(config.timeout(), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("PIPE_PROBE_PIPE", "/tmp/engine.sock"),
            ("PIPE_PROBE_METHOD", "POST"),
            ("PIPE_PROBE_TIMEOUT_MS", "250"),
            ("PIPE_PROBE_MAX_BODY_BYTES", "not-a-number"),
            ("PIPE_PROBE_LOG_LEVEL", "TRACE"),
        ]
        .into_iter()
        .collect();

        let mut config = ProbeConfig::default();
        config.apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.target.pipe_path, "/tmp/engine.sock");
        assert_eq!(config.target.request_path, "/info");
        assert_eq!(config.target.method, "POST");
        assert_eq!(config.client.timeout_ms, 250);
        assert_eq!(config.client.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_partial_toml_file_keeps_defaults() {
        let path = scratch_file(
            "probe.toml",
            "[target]\nrequest_path = \"/version\"\n\n[client]\ntimeout_ms = 5000\n",
        );

        let config = ProbeConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.target.request_path, "/version");
        assert_eq!(config.target.pipe_path, DEFAULT_PIPE_PATH);
        assert_eq!(config.client.timeout_ms, 5000);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_json_file_and_errors() {
        let path = scratch_file(
            "probe.json",
            r#"{"logging": {"level": "warn", "structured": true}}"#,
        );
        let config = ProbeConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.logging.level, "warn");
        assert!(config.logging.structured);

        let path = scratch_file("broken.toml", "[target\n");
        let err = ProbeConfig::from_file(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = ProbeConfig::from_toml_file("/nonexistent/pipe-probe.toml").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
