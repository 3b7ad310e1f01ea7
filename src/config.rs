// src/config.rs

//! Manages bridge configuration: loading from TOML and validation.
//!
//! Every key is optional. The listen address is deliberately absent: it is
//! delivered at runtime over the options port.

use crate::core::protocol::DEFAULT_MAX_FRAME_SIZE;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Tuning for the connection multiplexing service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// The buffer size used for each socket read.
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
    /// Capacity of the output event queue. Handlers wait when it is full.
    #[serde(default = "default_output_capacity")]
    pub output_capacity: usize,
    /// Upper bound for a single dispatch write in milliseconds. `0` disables the timeout.
    #[serde(default)]
    pub write_timeout_ms: u64,
    /// Connections beyond this limit are closed right after accept.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Pause after a transient accept error, in milliseconds.
    #[serde(default = "default_accept_backoff_ms")]
    pub accept_backoff_ms: u64,
    /// How long shutdown waits for handlers to finish before aborting them.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    #[serde(default = "default_tcp_nodelay")]
    pub tcp_nodelay: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: default_read_chunk_size(),
            output_capacity: default_output_capacity(),
            write_timeout_ms: 0,
            max_connections: default_max_connections(),
            accept_backoff_ms: default_accept_backoff_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            tcp_nodelay: default_tcp_nodelay(),
        }
    }
}

impl BridgeConfig {
    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }

    pub fn accept_backoff(&self) -> Duration {
        Duration::from_millis(self.accept_backoff_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn default_read_chunk_size() -> usize {
    4096
}
fn default_output_capacity() -> usize {
    1024
}
fn default_max_connections() -> usize {
    10_000
}
fn default_accept_backoff_ms() -> u64 {
    100
}
fn default_shutdown_grace_ms() -> u64 {
    2000
}
fn default_tcp_nodelay() -> bool {
    true
}

/// Settings for the message ports.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortsConfig {
    /// Largest information packet payload accepted or sent.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    /// Interval between attempts to (re)connect the output port.
    #[serde(default = "default_connect_retry_ms")]
    pub connect_retry_ms: u64,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            max_frame_size: default_max_frame_size(),
            connect_retry_ms: default_connect_retry_ms(),
        }
    }
}

impl PortsConfig {
    pub fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}
fn default_connect_retry_ms() -> u64 {
    500
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_port() -> u16 {
    8879
}

/// The top-level configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub ports: PortsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            bridge: BridgeConfig::default(),
            ports: PortsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Invalid configuration in '{path}'"))?;
        Ok(config)
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.bridge.read_chunk_size == 0 {
            return Err(anyhow!("bridge.read_chunk_size cannot be 0"));
        }
        if self.bridge.output_capacity == 0 {
            return Err(anyhow!("bridge.output_capacity cannot be 0"));
        }
        if self.bridge.max_connections == 0 {
            return Err(anyhow!("bridge.max_connections cannot be 0"));
        }
        if self.ports.max_frame_size == 0 {
            return Err(anyhow!("ports.max_frame_size cannot be 0"));
        }
        if self.ports.max_frame_size > u32::MAX as usize {
            return Err(anyhow!(
                "ports.max_frame_size cannot exceed {} bytes",
                u32::MAX
            ));
        }
        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(anyhow!("metrics.port cannot be 0 when metrics are enabled"));
        }
        if self.log_level.trim().is_empty() {
            return Err(anyhow!("log_level cannot be empty"));
        }
        Ok(())
    }
}
