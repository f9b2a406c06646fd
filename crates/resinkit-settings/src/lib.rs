//! ResinKit Settings Crate
//!
//! Handles application configuration and settings persistence.

pub mod config;
pub mod error;

pub use config::{default_config_path, Config, PrinterSettings, StorageSettings};
pub use error::{SettingsError, SettingsResult};
