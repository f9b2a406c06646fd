//! Printer lifecycle events
//!
//! Events are emitted by the printer driver and delivered to registered
//! listeners through [`ListenerRegistry`](crate::listener::ListenerRegistry).

use crate::data::{PrintStatus, PrinterState};

/// Printer event types
#[derive(Debug, Clone, PartialEq)]
pub enum PrinterEvent {
    /// Handshake succeeded
    Connected {
        /// Firmware version reported or configured
        firmware_version: String,
        /// Serial device
        port: String,
        /// Baud rate
        baud_rate: u32,
    },
    /// Link closed
    Disconnected,
    /// A job was started
    PrintStarted(String),
    /// The running job was paused
    PrintPaused(String),
    /// The paused job was resumed
    PrintResumed(String),
    /// A job ended, either stopped or run to completion
    PrintFinished {
        /// Job file
        filename: String,
        /// State the job was in before it ended
        previous_state: PrinterState,
    },
    /// A status refresh completed
    StatusUpdate {
        /// Job status after the refresh
        status: PrintStatus,
        /// Last known Z height
        z_position: f64,
        /// Selected job file, empty when none
        selected_file: String,
    },
}

impl PrinterEvent {
    /// Short stable name of the event kind
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "printer_connected",
            Self::Disconnected => "printer_disconnected",
            Self::PrintStarted(_) => "print_started",
            Self::PrintPaused(_) => "print_paused",
            Self::PrintResumed(_) => "print_resumed",
            Self::PrintFinished { .. } => "print_finished",
            Self::StatusUpdate { .. } => "status_update",
        }
    }
}

impl std::fmt::Display for PrinterEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected {
                firmware_version,
                port,
                baud_rate,
            } => write!(
                f,
                "Connected to {} @ {} baud (firmware {})",
                port, baud_rate, firmware_version
            ),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::PrintStarted(file) => write!(f, "Print started: {}", file),
            Self::PrintPaused(file) => write!(f, "Print paused: {}", file),
            Self::PrintResumed(file) => write!(f, "Print resumed: {}", file),
            Self::PrintFinished {
                filename,
                previous_state,
            } => write!(f, "Print finished: {} (was {})", filename, previous_state),
            Self::StatusUpdate { status, .. } => write!(
                f,
                "Status: {} {:.1}% ({}/{} bytes)",
                status.state, status.progress_percent, status.current_byte, status.total_bytes
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_display() {
        let event = PrinterEvent::PrintFinished {
            filename: "job.ctb".to_string(),
            previous_state: PrinterState::Printing,
        };
        assert_eq!(event.to_string(), "Print finished: job.ctb (was PRINTING)");
        assert_eq!(event.name(), "print_finished");
    }

    #[test]
    fn test_status_display() {
        let mut status = PrintStatus::with_state(PrinterState::Printing);
        status.record_bytes(50, 200);
        let event = PrinterEvent::StatusUpdate {
            status,
            z_position: 1.5,
            selected_file: String::new(),
        };
        assert_eq!(event.to_string(), "Status: PRINTING 25.0% (50/200 bytes)");
    }
}
