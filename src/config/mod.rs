//! Configuration module for tensile-daq
//!
//! This module handles the rig configuration:
//! - Hardware description (device name, input range, channel counts)
//! - Acquisition cadence and averaging factor
//! - Channel wiring
//! - Default unit system and specimen
//! - Logging
//!
//! # Config Location
//!
//! The default config file lives in the platform-appropriate data directory:
//! - **Linux**: `~/.local/share/dev.tensile-daq/`
//! - **macOS**: `~/Library/Application Support/dev.tensile-daq/`
//! - **Windows**: `%APPDATA%\dev.tensile-daq\`
//!
//! Files ending in `.json` are read as JSON, anything else as TOML.
//!
//! # Example
//!
//! ```ignore
//! use tensile_daq::config::AppConfig;
//!
//! let config = AppConfig::load_or_default(AppConfig::default_path()?);
//! let channels = config.channels.clone();
//! ```

use crate::error::{DaqError, Result, ValidationError};
use crate::types::{ChannelRole, ChannelSpec, CrossSection, SpecimenGeometry, UnitSystem, WiringMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for data directories
pub const APP_ID: &str = "dev.tensile-daq";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Default polling period in milliseconds
pub const DEFAULT_POLL_PERIOD_MS: u64 = 100;

/// Default number of samples pulled per channel per tick
pub const DEFAULT_AVERAGING_FACTOR: usize = 10;

/// Default consecutive failed ticks before a warning is raised
pub const DEFAULT_FAILURE_REPORT_THRESHOLD: u64 = 10;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        DaqError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            DaqError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

// ==================== App Config ====================

/// Complete rig configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Unit system selected at startup
    #[serde(default)]
    pub units: UnitSystem,

    /// Device description
    #[serde(default)]
    pub hardware: HardwareConfig,

    /// Acquisition loop settings
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Channels to register when arming
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelSpec>,

    /// Default specimen, if the operator keeps one on file
    #[serde(default)]
    pub specimen: Option<SpecimenConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            units: UnitSystem::default(),
            hardware: HardwareConfig::default(),
            acquisition: AcquisitionConfig::default(),
            channels: default_channels(),
            specimen: None,
            logging: LoggingConfig::default(),
        }
    }
}

/// Load cell on `ai3` (differential), extensometer on `ai1` (RSE)
fn default_channels() -> Vec<ChannelSpec> {
    let device = HardwareConfig::default().device;
    vec![
        ChannelSpec::new(&device, 3, WiringMode::Differential, ChannelRole::Force),
        ChannelSpec::new(&device, 1, WiringMode::ReferencedSingleEnded, ChannelRole::Elongation),
    ]
}

impl AppConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file path in the app data directory
    pub fn default_path() -> Option<PathBuf> {
        app_data_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DaqError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        if is_json(path) {
            serde_json::from_str(&content).map_err(|e| {
                DaqError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })
        } else {
            toml::from_str(&content).map_err(|e| {
                DaqError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })
        }
    }

    /// Load a config file, returning defaults if any error occurs
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Using default config: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to disk (JSON or TOML by extension)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DaqError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self)
                .map_err(|e| DaqError::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            toml::to_string_pretty(self)
                .map_err(|e| DaqError::Config(format!("Failed to serialize config: {}", e)))?
        };

        std::fs::write(path, content).map_err(|e| {
            DaqError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Geometry of the default specimen, if one is configured
    pub fn specimen_geometry(&self) -> Option<std::result::Result<SpecimenGeometry, ValidationError>> {
        self.specimen.as_ref().map(SpecimenConfig::geometry)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

// ==================== Hardware Config ====================

/// DAQ device description
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HardwareConfig {
    /// Device name used as the physical channel prefix
    pub device: String,

    /// Input range minimum in volts
    pub min_voltage: f64,

    /// Input range maximum in volts
    pub max_voltage: f64,

    /// Hardware sample clock in Hz
    pub sample_rate_hz: f64,

    /// Number of differential input pairs (`ai0..ai{n-1}` pair with `ai{n}..`)
    pub differential_channels: u32,

    /// Number of single-ended inputs
    pub single_ended_channels: u32,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            device: "Dev1".to_string(),
            min_voltage: -10.0,
            max_voltage: 10.0,
            sample_rate_hz: 100.0,
            differential_channels: 4,
            single_ended_channels: 8,
        }
    }
}

// ==================== Acquisition Config ====================

/// Acquisition loop settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcquisitionConfig {
    /// Polling period in milliseconds
    pub poll_period_ms: u64,

    /// Samples pulled per channel per tick (and per calibration read)
    pub averaging_factor: usize,

    /// Capacity of the event queue towards the consumer
    pub event_buffer_size: usize,

    /// How often the worker publishes stats, in milliseconds
    pub stats_interval_ms: u64,

    /// Consecutive failed ticks before a repeated-failure warning
    pub failure_report_threshold: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_period_ms: DEFAULT_POLL_PERIOD_MS,
            averaging_factor: DEFAULT_AVERAGING_FACTOR,
            event_buffer_size: 1024,
            stats_interval_ms: 500,
            failure_report_threshold: DEFAULT_FAILURE_REPORT_THRESHOLD,
        }
    }
}

impl AcquisitionConfig {
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms.max(1))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

// ==================== Specimen Config ====================

/// Specimen dimensions kept on file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecimenConfig {
    pub gauge_length: f64,
    /// Unit system the dimensions are given in
    #[serde(default)]
    pub units: UnitSystem,
    pub section: CrossSection,
}

impl SpecimenConfig {
    pub fn geometry(&self) -> std::result::Result<SpecimenGeometry, ValidationError> {
        SpecimenGeometry::from_section(self.section, self.gauge_length, self.units)
    }
}

// ==================== Logging Config ====================

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub filter: String,

    /// Directory for daily log files; stderr only when unset
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,tensile_daq=debug".to_string(),
            log_dir: None,
        }
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_channels() {
        let config = AppConfig::default();
        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[0].physical_channel, "Dev1/ai3");
        assert_eq!(config.channels[0].role, ChannelRole::Force);
        assert_eq!(config.channels[1].wiring, WiringMode::ReferencedSingleEnded);
        assert_eq!(config.acquisition.poll_period(), Duration::from_millis(100));
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rig.toml");

        let mut config = AppConfig::default();
        config.units = UnitSystem::Metric;
        config.specimen = Some(SpecimenConfig {
            section: CrossSection::Circular { diameter: 12.5 },
            gauge_length: 50.0,
            units: UnitSystem::Metric,
        });
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rig.json");

        let mut config = AppConfig::default();
        config.acquisition.averaging_factor = 25;
        config.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.trim_start().starts_with('{'));
        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "units = \"Metric\"\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.units, UnitSystem::Metric);
        assert_eq!(config.channels, default_channels());
        assert_eq!(config.acquisition, AcquisitionConfig::default());
    }

    #[test]
    fn test_load_or_default_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(dir.path().join("missing.toml"));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "units = [").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(DaqError::Config(_))));
    }

    #[test]
    fn test_specimen_geometry() {
        let mut config = AppConfig::default();
        assert!(config.specimen_geometry().is_none());

        config.specimen = Some(SpecimenConfig {
            section: CrossSection::Rectangular {
                width: 0.5,
                depth: 0.2,
            },
            gauge_length: 2.0,
            units: UnitSystem::English,
        });
        let geometry = config.specimen_geometry().unwrap().unwrap();
        assert!((geometry.area() - 0.1).abs() < 1e-12);
        assert_eq!(geometry.gauge_length(), 2.0);
    }
}
