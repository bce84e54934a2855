//! Configuration file parsing for logbridge
//!
//! Supports multiple configuration file formats:
//! - TOML (.toml)
//! - YAML (.yaml, .yml)
//! - JSON (.json)
//!
//! Values from the file are overridden by `LOGBRIDGE_*` environment variables,
//! which binaries in turn let command-line flags override.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(ConfigFormat::Toml),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }

    /// Detect format from file path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Durable store layout mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// One persistent folder reused across restarts
    Single,
    /// A new timestamp-named folder per aggregator start
    #[default]
    Session,
}

/// When a producer also prints forwarded batches locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EchoPolicy {
    /// Suppress only when the address was explicitly configured and the
    /// aggregator is believed available
    #[default]
    Auto,
    /// Always print locally
    Always,
    /// Never print a batch that was forwarded successfully
    Never,
}

/// Aggregator settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub host: String,
    /// Preferred port; an ephemeral one is used if it is taken
    pub port: u16,
    /// Ring buffer capacity
    pub capacity: usize,
    /// Token required on ingestion and mutation routes
    pub token: Option<String>,
    /// Project name advertised in the discovery record
    pub project: Option<String>,
    /// Also write the shared temp-dir discovery record
    pub legacy_discovery: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            capacity: DEFAULT_CAPACITY,
            token: None,
            project: None,
            legacy_discovery: true,
        }
    }
}

/// Durable session store settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub enabled: bool,
    /// Base directory; relative paths resolve against the working directory
    pub dir: PathBuf,
    pub mode: SessionMode,
    pub max_size_bytes: u64,
    pub max_files: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(STORE_DIR),
            mode: SessionMode::default(),
            max_size_bytes: DEFAULT_LOG_MAX_SIZE,
            max_files: DEFAULT_LOG_MAX_FILES,
        }
    }
}

/// Producer-side discovery and forwarding settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Explicit aggregator address; the source of truth when present
    pub url: Option<String>,
    pub project: Option<String>,
    pub probe_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub forward_timeout_ms: u64,
    pub stale_after_secs: u64,
    pub echo: EchoPolicy,
    /// Address the background probe tries when nothing was discovered
    pub fallback_url: Option<String>,
    /// Also consult the shared temp-dir discovery record
    pub legacy_discovery: bool,
    pub queue_depth: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            url: None,
            project: None,
            probe_interval_ms: DEFAULT_PROBE_INTERVAL_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            forward_timeout_ms: DEFAULT_FORWARD_TIMEOUT_MS,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            echo: EchoPolicy::default(),
            fallback_url: None,
            legacy_discovery: true,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl ProducerConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_timeout_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn fallback_url(&self) -> String {
        self.fallback_url.clone().unwrap_or_else(fallback_url)
    }
}

/// Configuration file structure (logbridge.toml/yaml/json)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub aggregator: AggregatorConfig,
    pub store: StoreConfig,
    pub producer: ProducerConfig,
}

impl ConfigFile {
    /// Load config from file, automatically detecting format from extension
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            Error::ConfigError(format!(
                "Unsupported config file extension: {}. Expected .toml, .yaml, .yml, or .json",
                path.display()
            ))
        })?;

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, format)
    }

    /// Parse config content with specified format
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Toml => Ok(toml::from_str(content)?),
            ConfigFormat::Yaml => Ok(serde_yaml::from_str(content)?),
            ConfigFormat::Json => Ok(serde_json::from_str(content)?),
        }
    }

    /// Find a config file in `dir`, then in the per-user config directory
    pub fn find(dir: &Path) -> Option<PathBuf> {
        let mut dirs = vec![dir.to_path_buf()];
        if let Some(user_dir) = user_config_dir() {
            dirs.push(user_dir);
        }

        dirs.iter()
            .flat_map(|d| CONFIG_FILES.iter().map(move |name| d.join(name)))
            .find(|path| path.exists())
    }

    /// Load the first config file found (or defaults) and apply environment overrides
    pub fn discover(dir: &Path) -> Result<Self> {
        let mut config = match Self::find(dir) {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `LOGBRIDGE_*` overrides using the given variable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_URL).filter(|v| !v.trim().is_empty()) {
            self.producer.url = Some(url);
        }

        if let Some(port) = lookup(ENV_PORT).filter(|v| !v.trim().is_empty()) {
            self.aggregator.port = port
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("Invalid {}: {}", ENV_PORT, port)))?;
        }

        if let Some(token) = lookup(ENV_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.aggregator.token = Some(token);
        }

        Ok(())
    }
}
