//! Printer listener interface
//!
//! Defines the listener trait for printer events and the registry the driver
//! dispatches through. Listeners are external collaborators: whatever they do,
//! a failing or panicking listener never reaches the driver.

use crate::data::{PrintStatus, PrinterState};
use crate::event::PrinterEvent;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use uuid::Uuid;

/// Handle for a registered printer listener.
///
/// Uniquely identifies a listener subscription. Can be used to unsubscribe
/// from printer events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerHandle(pub String);

/// Listener trait for printer events
///
/// Implement the hooks you care about; the rest default to no-ops.
pub trait PrinterListener: Send + Sync {
    /// Listener name used in logs
    fn name(&self) -> &str {
        "listener"
    }

    /// Called after a successful handshake
    fn on_printer_connected(
        &self,
        _firmware_version: &str,
        _port: &str,
        _baud_rate: u32,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after the link was closed
    fn on_printer_disconnected(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when a job starts
    fn on_print_started(&self, _filename: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when a job is paused
    fn on_print_paused(&self, _filename: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when a job is resumed
    fn on_print_resumed(&self, _filename: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when a job is stopped or completes
    fn on_print_finished(
        &self,
        _filename: &str,
        _previous_state: PrinterState,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after every status refresh
    fn on_status_update(
        &self,
        _status: &PrintStatus,
        _z_position: f64,
        _selected_file: &str,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Route one event to the matching hook
fn deliver(listener: &dyn PrinterListener, event: &PrinterEvent) -> anyhow::Result<()> {
    match event {
        PrinterEvent::Connected {
            firmware_version,
            port,
            baud_rate,
        } => listener.on_printer_connected(firmware_version, port, *baud_rate),
        PrinterEvent::Disconnected => listener.on_printer_disconnected(),
        PrinterEvent::PrintStarted(file) => listener.on_print_started(file),
        PrinterEvent::PrintPaused(file) => listener.on_print_paused(file),
        PrinterEvent::PrintResumed(file) => listener.on_print_resumed(file),
        PrinterEvent::PrintFinished {
            filename,
            previous_state,
        } => listener.on_print_finished(filename, *previous_state),
        PrinterEvent::StatusUpdate {
            status,
            z_position,
            selected_file,
        } => listener.on_status_update(status, *z_position, selected_file),
    }
}

/// Registered printer listeners
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<HashMap<ListenerHandle, Arc<dyn PrinterListener>>>,
}

impl ListenerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener and return its handle
    pub fn register(&self, listener: Arc<dyn PrinterListener>) -> ListenerHandle {
        let handle = ListenerHandle(Uuid::new_v4().to_string());
        tracing::debug!("Registered listener {} as {}", listener.name(), handle.0);
        self.listeners.write().insert(handle.clone(), listener);
        handle
    }

    /// Remove a listener. Returns false if the handle was unknown.
    pub fn unregister(&self, handle: &ListenerHandle) -> bool {
        self.listeners.write().remove(handle).is_some()
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Deliver an event to every listener.
    ///
    /// Listeners run outside the registry lock so they may register or
    /// unregister others. Errors and panics are logged and swallowed.
    pub fn dispatch(&self, event: &PrinterEvent) {
        let listeners: Vec<Arc<dyn PrinterListener>> =
            self.listeners.read().values().cloned().collect();

        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| deliver(listener.as_ref(), event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(
                        "Error calling {} on listener {}: {}",
                        event.name(),
                        listener.name(),
                        e
                    );
                }
                Err(_) => {
                    tracing::error!(
                        "Listener {} panicked while handling {}",
                        listener.name(),
                        event.name()
                    );
                }
            }
        }
    }
}
