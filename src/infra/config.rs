//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SiteConfig {
    /// Unique site identifier (e.g., "lab", "plant-2")
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "carbon".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_http_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { bind_address: default_http_bind_address(), port: default_http_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Path to the append-only record log (CSV)
    #[serde(default = "default_log_file")]
    pub file: String,
    /// Readings with an epoch-seconds timestamp below this are rejected
    #[serde(default = "default_min_valid_epoch")]
    pub min_valid_epoch: i64,
}

fn default_log_file() -> String {
    "sensor_data.csv".to_string()
}

fn default_min_valid_epoch() -> i64 {
    1_000_000_000
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { file: default_log_file(), min_valid_epoch: default_min_valid_epoch() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    /// Seconds between aggregate cache refresh cycles
    #[serde(default = "default_refresh_interval")]
    pub interval_secs: u64,
}

fn default_refresh_interval() -> u64 {
    60
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { interval_secs: default_refresh_interval() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between metrics summary log lines
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    60
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    http_bind_address: String,
    http_port: u16,
    log_file: String,
    min_valid_epoch: i64,
    refresh_interval_secs: u64,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            http_bind_address: default_http_bind_address(),
            http_port: default_http_port(),
            log_file: default_log_file(),
            min_valid_epoch: default_min_valid_epoch(),
            refresh_interval_secs: default_refresh_interval(),
            metrics_interval_secs: default_metrics_interval(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            site_id: toml_config.site.id,
            http_bind_address: toml_config.http.bind_address,
            http_port: toml_config.http.port,
            log_file: toml_config.log.file,
            min_valid_epoch: toml_config.log.min_valid_epoch,
            refresh_interval_secs: toml_config.refresh.interval_secs,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn http_bind_address(&self) -> &str {
        &self.http_bind_address
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn log_file(&self) -> &str {
        &self.log_file
    }

    pub fn min_valid_epoch(&self) -> i64 {
        self.min_valid_epoch
    }

    pub fn refresh_interval_secs(&self) -> u64 {
        self.refresh_interval_secs
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to point the log at a temp file
    #[cfg(test)]
    pub fn with_log_file(mut self, path: &str) -> Self {
        self.log_file = path.to_string();
        self
    }

    /// Builder method for tests to lower the plausibility threshold
    #[cfg(test)]
    pub fn with_min_valid_epoch(mut self, epoch: i64) -> Self {
        self.min_valid_epoch = epoch;
        self
    }
}
