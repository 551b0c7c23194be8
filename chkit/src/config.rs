use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cluster::Topology;
use crate::errors::{ClickHouseError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub topology: Topology,
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Extra attempts against the same host on connection-level errors.
    #[serde(default = "default_retries_per_host")]
    pub retries_per_host: u32,
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Rows buffered per table before an automatic flush; 0 sends every insert.
    #[serde(default)]
    pub buffer_size: usize,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    /// Timeout for the `CREATE DATABASE` broadcast issued on connect.
    #[serde(default = "default_init_timeout_secs")]
    pub init_timeout_secs: u64,
    /// Upper bound on the total time one query may spend failing over.
    /// Unset means retry until every host is cooling down.
    #[serde(default)]
    pub retry_deadline_ms: Option<u64>,
}

fn default_retries_per_host() -> u32 {
    2
}

fn default_init_timeout_secs() -> u64 {
    300
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            topology: Topology::Single("localhost:8123".to_string()),
            database: "default".to_string(),
            username: None,
            password: None,
            retries_per_host: default_retries_per_host(),
            backoff: BackoffConfig::default(),
            buffer_size: 0,
            request_timeout_ms: None,
            init_timeout_secs: default_init_timeout_secs(),
            retry_deadline_ms: None,
        }
    }
}

impl ClusterConfig {
    pub fn new(topology: Topology, database: impl Into<String>) -> Self {
        Self {
            topology,
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    pub fn retry_deadline(&self) -> Option<Duration> {
        self.retry_deadline_ms.map(Duration::from_millis)
    }

    /// Parse and validate a YAML document. Malformed input, including an
    /// invalid topology shape, is a `ConfigError`.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| ClickHouseError::ConfigError(format!("invalid cluster config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(ClickHouseError::ConfigError(
                "database name must not be empty".to_string(),
            ));
        }
        if self.database.contains('`') {
            return Err(ClickHouseError::ConfigError(format!(
                "database name {:?} must not contain backticks",
                self.database
            )));
        }
        self.backoff.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_ms: u64,
    pub multiplier: f64,
    pub ceiling_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: 1_000,
            multiplier: 2.0,
            ceiling_ms: 512_000,
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_ms == 0 {
            return Err(ClickHouseError::ConfigError(
                "backoff.initial_ms must be greater than zero".to_string(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ClickHouseError::ConfigError(format!(
                "backoff.multiplier must be a finite number of at least 1.0, got {}",
                self.multiplier
            )));
        }
        if self.ceiling_ms < self.initial_ms {
            return Err(ClickHouseError::ConfigError(format!(
                "backoff.ceiling_ms ({}) is below backoff.initial_ms ({})",
                self.ceiling_ms, self.initial_ms
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
