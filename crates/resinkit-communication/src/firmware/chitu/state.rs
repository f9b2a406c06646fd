//! Printer state machine
//!
//! Tracks what the host believes about the printer and applies the facts
//! extracted from responses. The driver owns one instance behind a lock;
//! every method here is a pure state transition.

use super::response_parser::{ProgressReport, ResponseUpdate, SdStatus};
use resinkit_core::{PrintStatus, PrinterSnapshot, PrinterState};

/// A job state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    /// State before the transition
    pub from: PrinterState,
    /// State after the transition
    pub to: PrinterState,
}

impl StateChange {
    /// True when this transition completed a job
    pub fn finished_job(&self) -> bool {
        self.to == PrinterState::Finished && self.from != PrinterState::Finished
    }
}

/// Host-side model of the printer
#[derive(Debug, Clone, PartialEq)]
pub struct PrinterStateMachine {
    connected: bool,
    firmware_version: String,
    status: PrintStatus,
    selected_file: String,
    z_position: f64,
}

impl PrinterStateMachine {
    /// Create a disconnected model assuming `firmware_version`
    pub fn new(firmware_version: impl Into<String>) -> Self {
        Self {
            connected: false,
            firmware_version: firmware_version.into(),
            status: PrintStatus::default(),
            selected_file: String::new(),
            z_position: 0.0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn firmware_version(&self) -> &str {
        &self.firmware_version
    }

    pub fn status(&self) -> &PrintStatus {
        &self.status
    }

    pub fn state(&self) -> PrinterState {
        self.status.state
    }

    pub fn selected_file(&self) -> &str {
        &self.selected_file
    }

    pub fn z_position(&self) -> f64 {
        self.z_position
    }

    /// Copy of everything known
    pub fn snapshot(&self) -> PrinterSnapshot {
        PrinterSnapshot {
            connected: self.connected,
            firmware_version: self.firmware_version.clone(),
            print_status: self.status.clone(),
            selected_file: self.selected_file.clone(),
            z_position: self.z_position,
        }
    }

    /// Handshake succeeded. A state left over from a failed session
    /// (`Unknown` or `Error`) resets to `Idle`.
    pub fn mark_connected(&mut self) -> Option<StateChange> {
        self.connected = true;
        match self.status.state {
            PrinterState::Unknown | PrinterState::Error => self.set_state(PrinterState::Idle),
            _ => None,
        }
    }

    /// Link closed; returns whether it was connected before
    pub fn mark_disconnected(&mut self) -> bool {
        std::mem::replace(&mut self.connected, false)
    }

    pub fn set_firmware_version(&mut self, version: impl Into<String>) {
        self.firmware_version = version.into();
    }

    pub fn set_selected_file(&mut self, filename: impl Into<String>) {
        self.selected_file = filename.into();
    }

    pub fn set_z_position(&mut self, z: f64) {
        self.z_position = z;
    }

    /// Move to `state`, reporting the transition if it changed anything
    pub fn set_state(&mut self, state: PrinterState) -> Option<StateChange> {
        let from = self.status.state;
        if from == state {
            return None;
        }
        self.status.state = state;
        Some(StateChange { from, to: state })
    }

    /// A new job starts from zero progress
    pub fn begin_job(&mut self) -> Option<StateChange> {
        self.status.clear_progress();
        self.set_state(PrinterState::Printing)
    }

    /// Stop the job: back to `Idle` with progress and file cleared.
    ///
    /// Returns the stopped file and the state the job was in.
    pub fn end_job(&mut self) -> (String, PrinterState) {
        let previous = self.status.state;
        self.status.state = PrinterState::Idle;
        self.status.clear_progress();
        (std::mem::take(&mut self.selected_file), previous)
    }

    /// Apply byte progress from the progress poll
    ///
    /// Reports with a zero total carry no job and are ignored. Otherwise:
    /// paused with bytes processed means `Paused`, all bytes processed means
    /// `Finished`, some bytes processed means `Printing`, and no bytes keeps
    /// the current state.
    pub fn apply_progress(&mut self, report: &ProgressReport) -> Option<StateChange> {
        if report.total == 0 {
            return None;
        }
        self.status.record_bytes(report.current, report.total);

        if report.paused && report.current > 0 {
            self.set_state(PrinterState::Paused)
        } else if report.current >= report.total {
            self.set_state(PrinterState::Finished)
        } else if report.current > 0 {
            self.set_state(PrinterState::Printing)
        } else {
            None
        }
    }

    /// Apply the storage status reply
    ///
    /// Byte progress with a non-zero total derives the state from the
    /// bytes; a zero total or "not printing" means `Idle`, the latter also
    /// clearing the recorded progress.
    pub fn apply_sd_status(&mut self, status: &SdStatus) -> Option<StateChange> {
        match *status {
            SdStatus::Printing { current, total } => {
                self.status.record_bytes(current, total);
                if total > 0 && current >= total {
                    self.set_state(PrinterState::Finished)
                } else if total > 0 && current > 0 {
                    self.set_state(PrinterState::Printing)
                } else {
                    self.set_state(PrinterState::Idle)
                }
            }
            SdStatus::NotPrinting => {
                self.status.clear_progress();
                self.set_state(PrinterState::Idle)
            }
        }
    }

    /// Apply any fact extracted by the response parser
    pub fn apply_update(&mut self, update: &ResponseUpdate) -> Option<StateChange> {
        match update {
            ResponseUpdate::Progress(report) => self.apply_progress(report),
            ResponseUpdate::StorageStatus(status) => self.apply_sd_status(status),
            ResponseUpdate::Position { z } => {
                self.z_position = *z;
                None
            }
            ResponseUpdate::FirmwareVersion(version) => {
                self.firmware_version = version.clone();
                None
            }
        }
    }
}
