//! Configuration system for SigMon
//!
//! Provides:
//! - Config file discovery (CLI flag, env var, standard path)
//! - TOML parsing with serde
//! - Environment variable overrides
//! - Typed validation at load time

use crate::events::Protocol;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete sensor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub sensor: SensorSettings,
    pub capture: CaptureSettings,
    pub decode: DecodeSettings,
    pub dictionary: DictionarySettings,
    pub health: HealthSettings,
}

/// Sensor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,

    /// Log output: text or json
    pub log_format: String,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

/// Kind of capture source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    File,
    Live,
}

/// One capture source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub source_type: SourceType,

    /// Directory scanned by file sources
    pub path: PathBuf,

    /// Keep polling the directory for new files
    pub watch: bool,

    /// Descend into subdirectories
    pub recursive: bool,

    /// File name glob
    pub pattern: String,

    /// Interface for live sources
    pub interface: String,

    pub snaplen: u32,

    pub promiscuous: bool,

    /// Vendor dictionary applied to packets from this source
    pub vendor: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            source_type: SourceType::File,
            path: PathBuf::from("/var/lib/sigmon/pcap"),
            watch: false,
            recursive: false,
            pattern: "*.pcap".to_string(),
            interface: String::new(),
            snaplen: 65535,
            promiscuous: true,
            vendor: None,
        }
    }
}

impl SourceConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn live(interface: impl Into<String>) -> Self {
        Self {
            source_type: SourceType::Live,
            interface: interface.into(),
            ..Default::default()
        }
    }

    /// Label used in logs and as the packet interface name
    pub fn label(&self) -> String {
        match self.source_type {
            SourceType::File => format!("file:{}", self.path.display()),
            SourceType::Live => format!("live:{}", self.interface),
        }
    }
}

/// Capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    #[serde(rename = "source")]
    pub sources: Vec<SourceConfig>,

    /// Watch-mode directory poll interval
    pub poll_interval_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            poll_interval_ms: 5000,
        }
    }
}

impl CaptureSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Decoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeSettings {
    /// Decoders in routing order; the first that accepts a payload wins
    pub protocols: Vec<String>,

    /// Capacity of the decoded message channel
    pub message_buffer: usize,
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Self {
            protocols: ["cap", "map", "diameter", "gtp", "pfcp", "s1ap", "ngap", "nas"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            message_buffer: 10_000,
        }
    }
}

/// Vendor dictionary settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DictionarySettings {
    pub base_path: PathBuf,

    /// Vendor used when a packet carries no vendor hint
    pub default_vendor: String,

    /// Vendor name -> directory relative to `base_path`
    pub vendors: BTreeMap<String, String>,
}

impl Default for DictionarySettings {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("/etc/sigmon/dictionaries"),
            default_vendor: "default".to_string(),
            vendors: BTreeMap::new(),
        }
    }
}

/// Health supervisor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    pub enabled: bool,
    pub check_interval_ms: u64,
    pub watchdog_enabled: bool,
    pub watchdog_timeout_ms: u64,
    pub restart_on_failure: bool,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_ms: 10_000,
            watchdog_enabled: true,
            watchdog_timeout_ms: 60_000,
            restart_on_failure: true,
        }
    }
}

impl HealthSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }
}

/// Configuration loader
pub struct ConfigLoader {
    /// Path to config file (if specified via CLI)
    cli_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self { cli_path: None }
    }

    /// Set the config path from CLI argument
    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    /// Load configuration with the following precedence:
    /// 1. CLI --config flag
    /// 2. SIGMON_CONFIG environment variable
    /// 3. /etc/sigmon/config.toml
    /// 4. Default values
    pub fn load(&self) -> ConfigResult<SensorConfig> {
        let mut config = match self.find_config_file()? {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)?
            }
            None => {
                debug!("No config file found, using defaults");
                SensorConfig::default()
            }
        };

        Self::apply_env_overrides(&mut config);
        Self::validate(&config)?;

        Ok(config)
    }

    /// Find the config file to use
    ///
    /// An explicit CLI path that does not exist is an error; discovered
    /// paths are skipped when absent.
    fn find_config_file(&self) -> ConfigResult<Option<PathBuf>> {
        if let Some(path) = &self.cli_path {
            if path.exists() {
                return Ok(Some(path.clone()));
            }
            return Err(ConfigError::NotFound(path.clone()));
        }

        if let Ok(env_path) = std::env::var("SIGMON_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok(Some(path));
            }
            warn!("SIGMON_CONFIG path does not exist: {}", env_path);
        }

        let path = PathBuf::from("/etc/sigmon/config.toml");
        if path.exists() {
            return Ok(Some(path));
        }

        Ok(None)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> ConfigResult<SensorConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: SensorConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(config: &mut SensorConfig) {
        if let Ok(val) = std::env::var("SIGMON_LOG_LEVEL") {
            config.sensor.log_level = val;
        }

        if let Ok(val) = std::env::var("SIGMON_CAPTURE_PATH") {
            match config
                .capture
                .sources
                .iter_mut()
                .find(|s| s.source_type == SourceType::File)
            {
                Some(source) => source.path = PathBuf::from(val),
                None => config.capture.sources.push(SourceConfig::file(val)),
            }
        }

        if let Ok(val) = std::env::var("SIGMON_DICTIONARY_PATH") {
            config.dictionary.base_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("SIGMON_WATCHDOG_TIMEOUT") {
            match val.parse::<u64>() {
                Ok(secs) => config.health.watchdog_timeout_ms = secs.saturating_mul(1000),
                Err(_) => warn!("Ignoring non-numeric SIGMON_WATCHDOG_TIMEOUT: {}", val),
            }
        }
    }

    /// Validate configuration
    pub fn validate(config: &SensorConfig) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.sensor.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                config.sensor.log_level, valid_levels
            )));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&config.sensor.log_format.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log format: {}. Must be one of: {:?}",
                config.sensor.log_format, valid_formats
            )));
        }

        for source in &config.capture.sources {
            match source.source_type {
                SourceType::File if source.path.as_os_str().is_empty() => {
                    return Err(ConfigError::ValidationError(
                        "File source requires a path".to_string(),
                    ));
                }
                SourceType::File if source.pattern.is_empty() => {
                    return Err(ConfigError::ValidationError(format!(
                        "File source {} requires a pattern",
                        source.path.display()
                    )));
                }
                SourceType::Live if source.interface.is_empty() => {
                    return Err(ConfigError::ValidationError(
                        "Live source requires an interface".to_string(),
                    ));
                }
                _ => {}
            }
        }

        if config.capture.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Poll interval cannot be 0".to_string(),
            ));
        }

        if config.decode.message_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "Message buffer cannot be 0".to_string(),
            ));
        }

        for name in &config.decode.protocols {
            if Protocol::family_from_name(name).is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "Unknown protocol: {}",
                    name
                )));
            }
        }

        let health = &config.health;
        if health.enabled && health.check_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Health check interval cannot be 0".to_string(),
            ));
        }
        if health.watchdog_enabled && health.watchdog_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Watchdog timeout cannot be 0".to_string(),
            ));
        }
        if health.enabled
            && health.watchdog_enabled
            && health.watchdog_timeout_ms < health.check_interval_ms.saturating_mul(2)
        {
            return Err(ConfigError::ValidationError(format!(
                "Watchdog timeout ({} ms) must be at least twice the check interval ({} ms)",
                health.watchdog_timeout_ms, health.check_interval_ms
            )));
        }

        Ok(())
    }

    /// Save configuration to a file
    pub fn save(config: &SensorConfig, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(config).map_err(|e| {
            ConfigError::ValidationError(format!("Failed to serialize config: {}", e))
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        info!("Configuration saved to: {}", path.display());
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
