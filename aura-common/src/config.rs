//! Configuration loading
//!
//! Config file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. `AURASYNC_CONFIG` environment variable
//! 3. Platform config directory (`<config_dir>/aurasync/config.toml`)
//! 4. Built-in defaults (no file)
//!
//! A missing file never stops startup: a warning is logged and defaults are
//! used. A file that exists but does not parse is a configuration error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "AURASYNC_CONFIG";

/// Tunables of the sync core
///
/// The dead-band and tick cadence are observed defaults, not derived limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Host broadcast cadence while playing
    pub tick_interval_ms: u64,

    /// Drift tolerated before a client issues a corrective seek
    pub dead_band_ms: u32,

    /// Upper bound on the client handshake, connect through subscribe
    pub connect_timeout_ms: u64,

    /// Client reads the characteristic once right after subscribing
    pub read_on_subscribe: bool,

    /// Capacity of the observer event channel
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            dead_band_ms: 800,
            connect_timeout_ms: 10_000,
            read_on_subscribe: false,
            event_capacity: 100,
        }
    }
}

impl SyncConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(Error::Config("sync.tick_interval_ms must be > 0".to_string()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(Error::Config(
                "sync.connect_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("sync.event_capacity must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full EnvFilter directive
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// HTTP control/observer API configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: 5860 }
    }
}

/// Contents of `config.toml`; every section is optional
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
    pub http: HttpConfig,
}

impl TomlConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}

/// Locates and loads the config file
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Path that will be loaded, if any
    ///
    /// Explicit paths (CLI, environment) are returned even if missing so the
    /// caller can warn about them; the platform default only if it exists.
    pub fn config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            return Some(path.clone());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        default_config_path().filter(|p| p.exists())
    }

    pub fn resolve(&self) -> Result<TomlConfig> {
        let config = match self.config_path() {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                TomlConfig::load(&path)?
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
                TomlConfig::default()
            }
            None => {
                info!("No config file found, using built-in defaults");
                TomlConfig::default()
            }
        };

        config.sync.validate()?;
        Ok(config)
    }
}

/// Platform default location of the config file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("aurasync").join("config.toml"))
}
