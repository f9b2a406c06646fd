//! # ResinKit
//!
//! Serial control host for resin 3D printers built on Chitu mainboards.
//!
//! ## Architecture
//!
//! ResinKit is organized as a workspace with multiple crates:
//!
//! 1. **resinkit-core** - Printer status model, errors, events, listeners
//! 2. **resinkit-settings** - Configuration model and persistence
//! 3. **resinkit-communication** - Serial transport and the Chitu driver
//! 4. **resinkit** - This crate: logging, application context, operator
//!    console
//!
//! The printer is driven over a half-duplex text protocol: every command is
//! answered by one line, which is normalized and folded into the printer
//! state. A background poller keeps job progress current while printing.

pub mod app;
pub mod console;
pub mod listeners;

pub use app::{controller_config, load_config, AppContext};
pub use listeners::LoggingListener;

pub use resinkit_communication::{list_ports, ChituController, ControllerConfig, SerialPortInfo};
pub use resinkit_core::{
    ConnectionError, Error, FirmwareError, ListenerHandle, ListenerRegistry, PrintStatus,
    PrinterEvent, PrinterListener, PrinterSnapshot, PrinterState, Result,
};
pub use resinkit_settings::{Config, PrinterSettings, StorageSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Output on stderr, leaving stdout to the console
/// - RUST_LOG environment variable support, INFO when unset
/// - Target, level, and thread names on every line
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
