//! Configuration loading
//!
//! Configuration file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`SEAMLESS_CONFIG`)
//! 3. User config file (`<config dir>/seamless/config.toml`)
//! 4. Built-in defaults (fallback)
//!
//! A missing file is not an error: the engine starts on defaults. A file
//! that exists but cannot be parsed is.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SEAMLESS_CONFIG";

/// Full engine configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub audio: AudioConfig,
    pub timing: TimingConfig,
    pub events: EventsConfig,
    pub logging: LoggingConfig,
}

/// Output device and working format
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Preferred working sample rate; the device may force another
    pub sample_rate: u32,

    /// Output device name (None = default device)
    pub device: Option<String>,

    /// Device buffer size in frames (None = device default)
    pub buffer_size: Option<u32>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            device: None,
            buffer_size: None,
        }
    }
}

/// Tick cadences and timing tolerances
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Fade driver tick interval
    pub fade_tick_ms: u64,

    /// Loop/position monitor tick interval
    pub monitor_tick_ms: u64,

    /// Registry synchronization tick interval
    pub sync_tick_ms: u64,

    /// Distance from the end of a track treated as "ended"
    pub end_tolerance_secs: f64,

    /// Shortest allowed fade
    pub min_fade_secs: f64,

    /// Fade length used by focus and fade-in/out-all when none is given
    pub default_fade_secs: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            fade_tick_ms: 16,
            monitor_tick_ms: 16,
            sync_tick_ms: 50,
            end_tolerance_secs: 0.1,
            min_fade_secs: 0.01,
            default_fade_secs: 2.0,
        }
    }
}

impl TimingConfig {
    pub fn fade_tick(&self) -> Duration {
        Duration::from_millis(self.fade_tick_ms.max(1))
    }

    pub fn monitor_tick(&self) -> Duration {
        Duration::from_millis(self.monitor_tick_ms.max(1))
    }

    pub fn sync_tick(&self) -> Duration {
        Duration::from_millis(self.sync_tick_ms.max(1))
    }
}

/// Event bus sizing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Resolve and load the configuration.
    ///
    /// `cli_path` wins over the environment variable, which wins over the
    /// user config file. With none present the built-in defaults are used.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path) {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::from_file(&path)
            }
            None => {
                debug!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("audio.sample_rate must be positive".to_string()));
        }
        if self.timing.end_tolerance_secs < 0.0 {
            return Err(Error::Config(
                "timing.end_tolerance_secs must not be negative".to_string(),
            ));
        }
        if self.timing.min_fade_secs <= 0.0 {
            return Err(Error::Config("timing.min_fade_secs must be positive".to_string()));
        }
        Ok(())
    }
}

/// Find the configuration file to load, if any.
///
/// An explicitly named file (argument or environment) is returned even if
/// it does not exist so that loading reports the I/O error.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config file
    default_config_path().filter(|path| path.exists())
}

/// Platform location of the user config file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("seamless").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.audio.sample_rate, 44_100);
        assert!(config.audio.device.is_none());
        assert_eq!(config.timing.fade_tick(), Duration::from_millis(16));
        assert_eq!(config.timing.sync_tick(), Duration::from_millis(50));
        assert_eq!(config.timing.end_tolerance_secs, 0.1);
        assert_eq!(config.timing.default_fade_secs, 2.0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [audio]
            device = "USB DAC"

            [timing]
            sync_tick_ms = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.audio.device.as_deref(), Some("USB DAC"));
        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.timing.sync_tick_ms, 100);
        assert_eq!(config.timing.fade_tick_ms, 16);
        assert_eq!(config.events.capacity, 256);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EngineConfig::from_toml_str("[audio]\nsample_rate = 0").is_err());
        assert!(EngineConfig::from_toml_str("[timing]\nmin_fade_secs = 0.0").is_err());
        assert!(EngineConfig::from_toml_str("[timing]\nend_tolerance_secs = -1.0").is_err());
        assert!(EngineConfig::from_toml_str("[audio\nbroken").is_err());
    }

    #[test]
    fn test_zero_tick_is_floored() {
        let config = EngineConfig::from_toml_str("[timing]\nfade_tick_ms = 0").unwrap();
        assert_eq!(config.timing.fade_tick(), Duration::from_millis(1));
    }
}
