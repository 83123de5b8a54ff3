//! Configuration management for Lampyris
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files.

use crate::error::{LampyrisError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Monitored beacon identity and meter calibration
    pub device: DeviceConfig,

    /// Readings database configuration
    pub storage: StorageConfig,

    /// Regional carbon-intensity API configuration
    pub intensity: IntensityConfig,

    /// Remote collector upload configuration
    pub upload: UploadConfig,

    /// Scan loop and watchdog configuration
    pub scan: ScanConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Monitored beacon parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Beacon address; only advertisements from this sender are decoded
    pub address: String,

    /// Meter calibration constant in pulses per kWh (usually 800 or 1000)
    pub imp_per_kwh: u32,
}

/// Readings database parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub db_path: String,
}

/// Carbon-intensity API parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntensityConfig {
    /// Whether carbon enrichment is enabled
    pub enabled: bool,

    /// Base URL of the intensity API
    pub api_url: String,

    /// Outward postcode selecting the region (e.g. "RH13")
    pub postcode: String,
}

/// Remote collector parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Whether uploads are enabled
    pub enabled: bool,

    /// Endpoint receiving the full readings export
    pub readings_url: String,

    /// Endpoint receiving the per-reading live power value (optional)
    pub live_kw_url: String,

    /// Basic-auth username (empty disables auth)
    pub username: String,

    /// Basic-auth password
    pub password: String,
}

/// Scan loop and watchdog parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Scanner helper command whose stdout emits "address payload-hex" lines
    pub helper_command: String,

    /// Additional arguments passed to the helper command
    pub helper_args: Vec<String>,

    /// Length of one scan cycle in seconds
    pub window_seconds: u64,

    /// Consecutive empty cycles tolerated before a restart is requested
    pub max_empty_cycles: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level override
    pub console_level: Option<String>,

    /// Optional file-specific level override
    pub file_level: Option<String>,

    /// Path to log file (or directory for the rolling appender)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: "c4:7c:8d:6a:4e:01".to_string(),
            imp_per_kwh: 800,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "/data/lampyris.db".to_string(),
        }
    }
}

impl Default for IntensityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: "https://api.carbonintensity.org.uk".to_string(),
            postcode: "RH13".to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            readings_url: String::new(),
            live_kw_url: String::new(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            helper_command: "lampyris-scan".to_string(),
            helper_args: Vec::new(),
            window_seconds: 10,
            max_empty_cycles: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/lampyris.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        let default_paths = [
            "lampyris.yaml",
            "/data/lampyris.yaml",
            "/etc/lampyris/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.device.address.is_empty() {
            return Err(LampyrisError::validation(
                "device.address",
                "Beacon address cannot be empty",
            ));
        }

        if self.device.imp_per_kwh == 0 {
            return Err(LampyrisError::validation(
                "device.imp_per_kwh",
                "Calibration constant must be greater than 0",
            ));
        }

        if self.storage.db_path.is_empty() {
            return Err(LampyrisError::validation(
                "storage.db_path",
                "Database path cannot be empty",
            ));
        }

        if self.scan.helper_command.is_empty() {
            return Err(LampyrisError::validation(
                "scan.helper_command",
                "Scanner command cannot be empty",
            ));
        }

        if self.scan.window_seconds == 0 {
            return Err(LampyrisError::validation(
                "scan.window_seconds",
                "Must be greater than 0",
            ));
        }

        if self.scan.max_empty_cycles == 0 {
            return Err(LampyrisError::validation(
                "scan.max_empty_cycles",
                "Must be greater than 0",
            ));
        }

        if self.intensity.enabled {
            if self.intensity.postcode.is_empty() {
                return Err(LampyrisError::validation(
                    "intensity.postcode",
                    "Postcode cannot be empty when enrichment is enabled",
                ));
            }
            if !self.intensity.api_url.starts_with("http") {
                return Err(LampyrisError::validation(
                    "intensity.api_url",
                    "Must be an http(s) URL",
                ));
            }
        }

        if self.upload.enabled {
            if !self.upload.readings_url.starts_with("http") {
                return Err(LampyrisError::validation(
                    "upload.readings_url",
                    "Must be an http(s) URL when uploads are enabled",
                ));
            }
            if !self.upload.live_kw_url.is_empty() && !self.upload.live_kw_url.starts_with("http") {
                return Err(LampyrisError::validation(
                    "upload.live_kw_url",
                    "Must be an http(s) URL",
                ));
            }
        }

        Ok(())
    }
}
