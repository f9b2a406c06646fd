//! Application context
//!
//! Everything the process shares is built once here and passed down
//! explicitly: the loaded configuration, the listener registry, and the
//! printer controller.

use crate::listeners::LoggingListener;
use resinkit_communication::{ChituController, ControllerConfig, LinkOpener, SerialPortOpener};
use resinkit_core::ListenerRegistry;
use resinkit_settings::{Config, PrinterSettings};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Translate persisted printer settings into controller timing
pub fn controller_config(settings: &PrinterSettings) -> ControllerConfig {
    ControllerConfig {
        port: settings.serial_port.clone(),
        baud_rate: settings.baud_rate,
        timeout: Duration::from_millis(settings.timeout_ms),
        firmware_version: settings.firmware_version.clone(),
        hello_command: settings.hello_command.clone(),
        progress_poll_command: settings.progress_poll_command.clone(),
        start_print_command: settings.start_print_command.clone(),
        slow_command_timeout_factor: settings.slow_command_timeout_factor,
        poll_interval: Duration::from_millis(settings.poll_interval_ms),
        poll_error_backoff: Duration::from_millis(settings.poll_error_backoff_ms),
        poller_join_timeout: Duration::from_millis(settings.poller_join_timeout_ms),
        settle_delay: Duration::from_millis(settings.settle_delay_ms),
        port_release_delay: Duration::from_millis(settings.port_release_delay_ms),
        storage_init_delay: Duration::from_millis(settings.storage_init_delay_ms),
        move_feed_rate: settings.move_feed_rate,
    }
}

/// Load the configuration at `path`, creating it when missing
///
/// An unreadable or unwritable config is logged and replaced by defaults.
pub fn load_config(path: &Path) -> Config {
    match Config::load_or_create(path) {
        Ok(config) => {
            tracing::info!("Using configuration {}", path.display());
            config
        }
        Err(e) => {
            tracing::warn!(
                "Failed to load config from {}: {}; using defaults",
                path.display(),
                e
            );
            Config::default()
        }
    }
}

/// Shared application state
pub struct AppContext {
    /// Loaded configuration
    pub config: Config,
    /// Listeners notified about printer events
    pub listeners: Arc<ListenerRegistry>,
    /// The printer driver
    pub controller: Arc<ChituController>,
}

impl AppContext {
    /// Build the context for a real serial port
    pub fn new(config: Config) -> Self {
        Self::with_opener(config, Box::new(SerialPortOpener))
    }

    /// Build the context with a custom link opener
    pub fn with_opener(config: Config, opener: Box<dyn LinkOpener>) -> Self {
        let listeners = Arc::new(ListenerRegistry::new());
        listeners.register(Arc::new(LoggingListener));

        let controller = Arc::new(ChituController::new(
            controller_config(&config.printer),
            opener,
            Arc::clone(&listeners),
        ));

        Self {
            config,
            listeners,
            controller,
        }
    }

    /// Log problems with the storage mount; they are never fatal
    pub fn check_storage(&self) -> bool {
        match self.config.storage.mount_problem() {
            Some(problem) => {
                tracing::warn!("{}; job files will not be visible to the printer", problem);
                false
            }
            None => true,
        }
    }

    /// Release the printer
    pub fn shutdown(&self) {
        self.controller.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_config_from_settings() {
        let mut settings = PrinterSettings::default();
        settings.serial_port = "/dev/ttyUSB0".to_string();
        settings.timeout_ms = 2500;
        settings.poll_interval_ms = 1000;

        let config = controller_config(&settings);
        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.settle_delay, Duration::from_secs(2));
        assert_eq!(config.start_print_command, "M6030");
    }

    #[test]
    fn test_defaults_match_controller_defaults() {
        assert_eq!(
            controller_config(&PrinterSettings::default()),
            ControllerConfig::default()
        );
    }

    #[test]
    fn test_context_registers_logging_listener() {
        let context = AppContext::new(Config::default());
        assert_eq!(context.listeners.len(), 1);
        assert!(!context.controller.is_connected());
        context.shutdown();
    }

    #[test]
    fn test_missing_mount_point_is_reported() {
        let mut config = Config::default();
        config.storage.mount_point = "/nonexistent/resinkit/mount".into();
        let context = AppContext::new(config);
        assert!(!context.check_storage());
    }

    #[test]
    fn test_existing_mount_point_passes() {
        let mount = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.mount_point = mount.path().to_path_buf();
        assert!(AppContext::new(config).check_storage());
    }

    #[test]
    fn test_load_config_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(load_config(&path), Config::default());
        assert!(path.exists());
    }

    #[test]
    fn test_unusable_config_path_falls_back_to_defaults() {
        // A regular file where the config directory should be
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let path = blocker.path().join("resinkit").join("config.toml");
        assert_eq!(load_config(&path), Config::default());
    }
}
