//! Printer status data model
//!
//! Plain data describing what the host knows about the printer: the job
//! state, byte progress of the running job, and the last reported Z height.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Job state of the printer as derived from firmware responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrinterState {
    /// Connected, no job running
    #[default]
    Idle,
    /// A job is running
    Printing,
    /// A job is paused
    Paused,
    /// The running job reached its last byte
    Finished,
    /// The last status query failed
    Error,
    /// State was requested while no link was open
    Unknown,
}

impl PrinterState {
    /// Upper-case name used in status envelopes and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Printing => "PRINTING",
            Self::Paused => "PAUSED",
            Self::Finished => "FINISHED",
            Self::Error => "ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// True while a job occupies the printer
    pub fn is_job_active(&self) -> bool {
        matches!(self, Self::Printing | Self::Paused)
    }
}

impl fmt::Display for PrinterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of the current job
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PrintStatus {
    /// Job state
    pub state: PrinterState,
    /// Progress in percent, 0..=100
    pub progress_percent: f64,
    /// Current layer (not reported by this firmware, kept for API shape)
    pub current_layer: u32,
    /// Total layers (not reported by this firmware, kept for API shape)
    pub total_layers: u32,
    /// Bytes of the job file already processed
    pub current_byte: u64,
    /// Size of the job file in bytes
    pub total_bytes: u64,
}

impl PrintStatus {
    /// A status carrying only a state
    pub fn with_state(state: PrinterState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    /// Record byte progress and recompute the percentage.
    ///
    /// The percentage is only recomputed when `total` is non-zero and is
    /// clamped to 0..=100.
    pub fn record_bytes(&mut self, current: u64, total: u64) {
        self.current_byte = current;
        self.total_bytes = total;
        if total > 0 {
            self.progress_percent = progress_percent(current, total);
        }
    }

    /// Forget the progress of the previous job
    pub fn clear_progress(&mut self) {
        self.progress_percent = 0.0;
        self.current_byte = 0;
    }
}

/// `100 * current / total`, clamped to 0..=100. Zero when `total` is zero.
pub fn progress_percent(current: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (current as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Point-in-time copy of everything the driver knows about the printer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterSnapshot {
    /// Whether a link is open and the handshake succeeded
    pub connected: bool,
    /// Firmware version, configured or discovered
    pub firmware_version: String,
    /// Job status
    pub print_status: PrintStatus,
    /// File currently opened on the printer storage, empty when none
    pub selected_file: String,
    /// Last known Z height in millimetres
    pub z_position: f64,
}
