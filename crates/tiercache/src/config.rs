//! Configuration loading

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tiercache_core::KeyValSettings;
use tiercache_core::PersistConfig;
use tiercache_core::config::DEFAULT_MAX_BODY_SIZE;
use tiercache_storage::StoreConfig;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub keyval: KeyValConfig,
    #[serde(default)]
    pub persist: PersistSection,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Write and miss defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyValConfig {
    #[serde(default = "default_content_type")]
    pub default_content_type: String,
    /// TTL for writes without one; unset means such writes are rejected
    #[serde(default)]
    pub default_ttl: Option<u64>,
    /// Negative-cache TTL for misses, seconds
    #[serde(default)]
    pub miss_ttl: u64,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for KeyValConfig {
    fn default() -> Self {
        Self {
            default_content_type: default_content_type(),
            default_ttl: None,
            miss_ttl: 0,
            max_body_size: default_max_body_size(),
        }
    }
}

/// Durable tier configuration
///
/// ```toml
/// [persist]
/// enabled = "header"
/// bucket = "kv"
///
/// [persist.store]
/// type = "local"
/// root = "./data/durable"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistSection {
    #[serde(flatten)]
    pub policy: PersistConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Serve Prometheus metrics on `/-/metrics`
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_content_type() -> String {
    tiercache_core::entry::FALLBACK_CONTENT_TYPE.to_string()
}

fn default_max_body_size() -> usize {
    DEFAULT_MAX_BODY_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &str) -> Result<Self> {
        let config_path = Path::new(path);

        if !config_path.exists() {
            info!("Config file not found at {}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        info!("Loaded configuration from {}", path);
        Ok(config)
    }

    /// Server settings, validated
    pub fn keyval_settings(&self) -> Result<KeyValSettings> {
        let settings = KeyValSettings {
            default_content_type: self.keyval.default_content_type.clone(),
            default_ttl: self.keyval.default_ttl.filter(|ttl| *ttl > 0),
            miss_ttl: self.keyval.miss_ttl,
            max_body_size: self.keyval.max_body_size,
            persist: self.persist.policy.clone(),
        };
        settings
            .validate()
            .context("Invalid [keyval]/[persist] configuration")?;
        Ok(settings)
    }
}
