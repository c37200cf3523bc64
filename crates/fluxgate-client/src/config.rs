//! Client configuration - can be built in code or loaded from YAML

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default port of the HTTP API
pub const DEFAULT_PORT: u16 = 8086;
/// Credential used for both user and password when none is given
pub const DEFAULT_CREDENTIAL: &str = "root";
/// Retention policy every write targets unless configured otherwise
pub const DEFAULT_RETENTION_POLICY: &str = "default";

/// Complete client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host name or address
    pub host: String,
    /// Server HTTP port
    pub port: u16,
    /// User name for basic auth
    pub username: String,
    /// Password for basic auth
    pub password: String,
    /// Retention policy written points are stored under
    pub retention_policy: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Write batching
    pub batch: BatchSettings,
    /// Readiness probe pacing
    pub probe: ProbeSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            username: DEFAULT_CREDENTIAL.to_string(),
            password: DEFAULT_CREDENTIAL.to_string(),
            retention_policy: DEFAULT_RETENTION_POLICY.to_string(),
            request_timeout_secs: 30,
            batch: BatchSettings::default(),
            probe: ProbeSettings::default(),
        }
    }
}

/// Flush thresholds of the background batch writer; whichever is hit first wins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Flush once this many points are queued
    pub actions: usize,
    /// Flush once the oldest queued point is this old (milliseconds)
    pub flush_interval_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            actions: 1000,
            flush_interval_ms: 100,
        }
    }
}

impl BatchSettings {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// Readiness probe pacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Sleep between probe attempts (milliseconds)
    pub interval_ms: u64,
    /// Attempts granted per unit of `ping` timeout
    pub attempts_per_unit: u32,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            attempts_per_unit: 10,
        }
    }
}

impl ProbeSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl ClientConfig {
    /// Configuration for `host` with the default credentials
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Configuration for `host` with explicit credentials
    pub fn with_credentials(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    /// Override the port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Reject settings the client cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(ClientError::Config("host must not be empty".to_string()));
        }
        if self.retention_policy.is_empty() {
            return Err(ClientError::Config(
                "retention_policy must not be empty".to_string(),
            ));
        }
        if self.batch.actions == 0 {
            return Err(ClientError::Config("batch.actions must be at least 1".to_string()));
        }
        if self.batch.flush_interval_ms == 0 {
            return Err(ClientError::Config(
                "batch.flush_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URL of the HTTP API
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
