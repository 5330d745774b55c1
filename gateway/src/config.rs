//! Configuration for the gateway.

use std::collections::HashMap;
use std::time::Duration;

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

use modelrelay_common::InstanceDescriptor;

use crate::gateway::{ExecutionConfig, HealthConfig, QueueConfig};

/// Main configuration structure for the gateway.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    /// Instances registered at startup.
    #[serde(default)]
    pub instances: Vec<InstanceDescriptor>,
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub execution: ExecutionSettings,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthSettings {
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_probe_path")]
    pub probe_path: String,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval(),
            probe_timeout_ms: default_probe_timeout(),
            probe_path: default_probe_path(),
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
        }
    }
}

impl HealthSettings {
    pub fn to_health_config(&self) -> HealthConfig {
        HealthConfig {
            interval: Duration::from_secs(self.interval_secs),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            probe_path: self.probe_path.clone(),
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    #[serde(default = "default_queue_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_residency")]
    pub max_residency_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_depth: default_queue_depth(),
            max_residency_secs: default_max_residency(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl QueueSettings {
    pub fn to_queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_depth: self.max_depth,
            max_residency: Duration::from_secs(self.max_residency_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionSettings {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_ms: u64,
    /// Deadline applied when the caller does not set one.
    #[serde(default = "default_deadline")]
    pub default_deadline_secs: u64,
    /// Ceiling for caller-supplied deadlines.
    #[serde(default = "default_max_deadline")]
    pub max_deadline_secs: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base(),
            backoff_cap_ms: default_backoff_cap(),
            default_deadline_secs: default_deadline(),
            max_deadline_secs: default_max_deadline(),
        }
    }
}

impl ExecutionSettings {
    pub fn to_execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_cap: Duration::from_millis(self.backoff_cap_ms),
        }
    }

    pub fn default_deadline(&self) -> Duration {
        Duration::from_secs(self.default_deadline_secs)
    }

    pub fn max_deadline(&self) -> Duration {
        Duration::from_secs(self.max_deadline_secs)
    }
}

/// Model catalog: default endpoints by model id, used when an instance
/// registers without an explicit endpoint.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CatalogConfig {
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_health_interval() -> u64 {
    5
}
fn default_probe_timeout() -> u64 {
    2000
}
fn default_probe_path() -> String {
    "/health".to_string()
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_success_threshold() -> u32 {
    2
}
fn default_queue_depth() -> usize {
    64
}
fn default_max_residency() -> u64 {
    30
}
fn default_poll_interval() -> u64 {
    100
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}
fn default_backoff_base() -> u64 {
    100
}
fn default_backoff_cap() -> u64 {
    2000
}
fn default_deadline() -> u64 {
    60
}
fn default_max_deadline() -> u64 {
    300
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (GATEWAY__SECTION__KEY format)
    /// 2. gateway.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("gateway").required(false))
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
