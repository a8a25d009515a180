//! Configuration file parsing for LogDeck
//!
//! Supports multiple configuration file formats:
//! - TOML (.toml)
//! - YAML (.yaml, .yml)
//! - JSON (.json)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
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

/// On-disk record format of a log source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// `[timestamp] LEVEL message` lines
    Text,
    /// JSON for lines starting with `{`, text otherwise
    #[default]
    Auto,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogFormat::Json => "json",
            LogFormat::Text => "text",
            LogFormat::Auto => "auto",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" | "jsonl" | "ndjson" => Ok(LogFormat::Json),
            "text" | "plain" => Ok(LogFormat::Text),
            "auto" => Ok(LogFormat::Auto),
            _ => Err(Error::config(format!("Unknown log format: {}", s))),
        }
    }
}

/// Explicitly configured log source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub path: PathBuf,
    /// Overrides the server-wide format for this source
    pub format: Option<LogFormat>,
}

/// Live-tail tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Reordering window; bounds the display delay of a streamed entry
    pub window_ms: u64,
    /// Fallback poll interval when no file-system event arrives
    pub poll_ms: u64,
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_STREAM_WINDOW_MS,
            poll_ms: DEFAULT_STREAM_POLL_MS,
            channel_capacity: DEFAULT_STREAM_CHANNEL_CAPACITY,
        }
    }
}

impl StreamConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(1))
    }
}

/// Server configuration (logdeck.toml/yaml/json)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub static_prefix: String,
    /// Directory scanned for `source_pattern` files
    pub log_dir: Option<PathBuf>,
    pub source_pattern: String,
    pub sources: Vec<SourceConfig>,
    pub format: LogFormat,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub stream: StreamConfig,
    pub cors_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            static_prefix: DEFAULT_STATIC_PREFIX.to_string(),
            log_dir: Some(logs_dir()),
            source_pattern: DEFAULT_SOURCE_PATTERN.to_string(),
            sources: Vec::new(),
            format: LogFormat::Auto,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            stream: StreamConfig::default(),
            cors_origin: None,
        }
    }
}

impl ServerConfig {
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
        let config = Self::parse(&content, format)?;
        config.validate()?;
        Ok(config)
    }

    /// Find the first known config file in `dir`
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.is_file())
    }

    /// Parse config content with specified format
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let config = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_page_size == 0 {
            return Err(Error::config("max_page_size must be at least 1"));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(Error::config(format!(
                "default_page_size must be between 1 and {}",
                self.max_page_size
            )));
        }
        if !self.static_prefix.starts_with('/') {
            return Err(Error::config("static_prefix must start with '/'"));
        }

        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(Error::config("source id must not be empty"));
            }
            if source.id.contains(',') {
                return Err(Error::config(format!(
                    "source id '{}' must not contain ','",
                    source.id
                )));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(Error::config(format!("duplicate source id '{}'", source.id)));
            }
        }
        Ok(())
    }

    /// Socket address string to bind
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
