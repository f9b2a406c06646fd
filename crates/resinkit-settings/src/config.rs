//! Configuration and settings management for ResinKit
//!
//! Provides configuration file handling, defaults, and validation.
//! Supports JSON and TOML file formats; the format is chosen by extension.
//!
//! Configuration is organized into logical sections:
//! - Printer settings (serial link, timeouts, firmware dialect commands)
//! - Storage settings (the mass-storage mount the printer reads jobs from)
//!
//! Every section is `#[serde(default)]`, so a partial file is merged over
//! the defaults.

use crate::error::{SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Serial link and firmware dialect settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterSettings {
    /// Serial device the printer board is attached to
    pub serial_port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Response timeout for ordinary commands in milliseconds
    pub timeout_ms: u64,
    /// Firmware version assumed until the board reports one
    pub firmware_version: String,
    /// Liveness command sent on connect
    pub hello_command: String,
    /// Command whose reply carries job byte progress
    pub progress_poll_command: String,
    /// Command that starts printing a file
    pub start_print_command: String,
    /// Timeout multiplier for commands that touch the printer storage
    pub slow_command_timeout_factor: u32,
    /// Status poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Delay after a failed poll in milliseconds
    pub poll_error_backoff_ms: u64,
    /// Upper bound on waiting for the poller to exit in milliseconds
    pub poller_join_timeout_ms: u64,
    /// Wait after opening the port; the board resets on open
    pub settle_delay_ms: u64,
    /// Wait before reopening a port that was just closed
    pub port_release_delay_ms: u64,
    /// Wait after the storage init command
    pub storage_init_delay_ms: u64,
    /// Feed rate for relative Z moves
    pub move_feed_rate: u32,
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            serial_port: "/dev/serial0".to_string(),
            baud_rate: 115200,
            timeout_ms: 5000,
            firmware_version: "V4.13".to_string(),
            hello_command: "M4002".to_string(),
            progress_poll_command: "M4000".to_string(),
            start_print_command: "M6030".to_string(),
            slow_command_timeout_factor: 3,
            poll_interval_ms: 3000,
            poll_error_backoff_ms: 5000,
            poller_join_timeout_ms: 5000,
            settle_delay_ms: 2000,
            port_release_delay_ms: 1000,
            storage_init_delay_ms: 1000,
            move_feed_rate: 600,
        }
    }
}

/// Mass-storage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Where the shared USB image is mounted on the host
    pub mount_point: PathBuf,
    /// Job file extensions the printer understands
    pub allowed_extensions: Vec<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::from("/mnt/usb_share"),
            allowed_extensions: [
                ".ctb", ".cbddlp", ".pwmx", ".pwmo", ".pwms", ".pws", ".pw0", ".pwx",
            ]
            .iter()
            .map(|ext| ext.to_string())
            .collect(),
        }
    }
}

impl StorageSettings {
    /// Check whether a file name carries an allowed extension (case-insensitive)
    pub fn is_allowed_file(&self, filename: &str) -> bool {
        let lower = filename.to_ascii_lowercase();
        self.allowed_extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
    }

    /// Describe why the mount point is unusable, if it is
    pub fn mount_problem(&self) -> Option<String> {
        if !self.mount_point.exists() {
            return Some(format!(
                "Mount point {} does not exist",
                self.mount_point.display()
            ));
        }
        if !self.mount_point.is_dir() {
            return Some(format!(
                "Mount point {} is not a directory",
                self.mount_point.display()
            ));
        }
        None
    }
}

/// On-disk format of a config file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> SettingsResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            other => Err(SettingsError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Printer link settings
    pub printer: PrinterSettings,
    /// Storage settings
    pub storage: StorageSettings,
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("{}: {}", path.display(), e))
        })?;

        let config: Self = match format {
            ConfigFormat::Json => serde_json::from_str(&content)?,
            ConfigFormat::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        let format = ConfigFormat::from_path(path)?;

        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| SettingsError::ConfigDirectory(format!("{}: {}", parent.display(), e)))?;
        }

        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;

        Ok(())
    }

    /// Load config, writing the defaults first if the file does not exist
    pub fn load_or_create(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            return Self::load_from_file(path);
        }

        let config = Self::default();
        config.save_to_file(path)?;
        tracing::info!("Created default configuration at {}", path.display());
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        let printer = &self.printer;

        if printer.serial_port.trim().is_empty() {
            return Err(SettingsError::invalid("printer.serial_port", "must not be empty"));
        }

        if printer.baud_rate == 0 {
            return Err(SettingsError::invalid("printer.baud_rate", "must be > 0"));
        }

        for (key, value) in [
            ("printer.timeout_ms", printer.timeout_ms),
            ("printer.poll_interval_ms", printer.poll_interval_ms),
            ("printer.poll_error_backoff_ms", printer.poll_error_backoff_ms),
            ("printer.poller_join_timeout_ms", printer.poller_join_timeout_ms),
        ] {
            if value == 0 {
                return Err(SettingsError::invalid(key, "must be > 0"));
            }
        }

        if printer.slow_command_timeout_factor == 0 {
            return Err(SettingsError::invalid(
                "printer.slow_command_timeout_factor",
                "must be > 0",
            ));
        }

        for (key, value) in [
            ("printer.hello_command", &printer.hello_command),
            ("printer.progress_poll_command", &printer.progress_poll_command),
            ("printer.start_print_command", &printer.start_print_command),
        ] {
            if value.trim().is_empty() {
                return Err(SettingsError::invalid(key, "must not be empty"));
            }
        }

        if printer.move_feed_rate == 0 {
            return Err(SettingsError::invalid("printer.move_feed_rate", "must be > 0"));
        }

        Ok(())
    }
}

/// Default location of the config file
///
/// `<platform config dir>/resinkit/config.toml`, or `config/config.toml`
/// relative to the working directory when the platform has none.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("resinkit").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.printer.serial_port, "/dev/serial0");
        assert_eq!(config.printer.baud_rate, 115200);
        assert_eq!(config.printer.firmware_version, "V4.13");
        assert_eq!(config.printer.poll_interval_ms, 3000);
    }

    #[test]
    fn test_partial_toml_merges_over_defaults() {
        let config: Config = toml::from_str(
            r#"
            [printer]
            serial_port = "/dev/ttyUSB0"
            baud_rate = 250000
            "#,
        )
        .unwrap();

        assert_eq!(config.printer.serial_port, "/dev/ttyUSB0");
        assert_eq!(config.printer.baud_rate, 250000);
        assert_eq!(config.printer.timeout_ms, 5000);
        assert_eq!(config.storage, StorageSettings::default());
    }

    #[test]
    fn test_validate_rejects_zero_baud() {
        let mut config = Config::new();
        config.printer.baud_rate = 0;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::InvalidSetting { ref key, .. }) if key == "printer.baud_rate"
        ));
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        let mut config = Config::new();
        config.printer.hello_command = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_allowed_extensions() {
        let storage = StorageSettings::default();
        assert!(storage.is_allowed_file("job.ctb"));
        assert!(storage.is_allowed_file("JOB.PWMX"));
        assert!(!storage.is_allowed_file("notes.txt"));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = Config::load_from_file(Path::new("config.yaml")).unwrap_err();
        assert!(matches!(err, SettingsError::UnsupportedFormat(ref ext) if ext == "yaml"));
    }
}
