//! # ResinKit Communication
//!
//! Serial transport and the Chitu firmware driver.
//!
//! - [`communication`]: the line-oriented link traits, the serialport-backed
//!   link, and port enumeration
//! - [`firmware`]: the Chitu command vocabulary, response parser, printer
//!   state machine, controller, and background status poller

pub mod communication;
pub mod firmware;

pub use communication::{
    list_ports, LinkOpener, LinkParams, SerialLink, SerialPortInfo, SerialPortLink,
    SerialPortOpener,
};
pub use firmware::chitu::{ChituController, ControllerConfig};
pub use firmware::status_poller::{PollTarget, PollerConfig, StatusPoller};
