//! # ResinKit Core
//!
//! Core types, traits, and utilities for ResinKit.
//! Provides the printer status model, the error taxonomy shared by the
//! transport and the driver, and the event/listener contract used to notify
//! plugins about printer lifecycle changes.

pub mod data;
pub mod error;
pub mod event;
pub mod listener;

pub use data::{progress_percent, PrintStatus, PrinterSnapshot, PrinterState};
pub use error::{ConnectionError, Error, FirmwareError, Result};
pub use event::PrinterEvent;
pub use listener::{ListenerHandle, ListenerRegistry, PrinterListener};
