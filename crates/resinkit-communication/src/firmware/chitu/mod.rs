//! Chitu firmware support
//!
//! Chitu boards drive most consumer resin printers. They accept a subset of
//! G-code plus vendor M-codes (`M4000` progress, `M4002` hello, `M6030`
//! start print) and answer in a dialect the [`response_parser`] normalizes.

pub mod commands;
pub mod controller;
pub mod response_parser;
pub mod state;

pub use controller::{ChituController, ControllerConfig};
pub use response_parser::{
    ChituResponseParser, ParsedResponse, ProgressReport, ResponseUpdate, RewriteKind, SdStatus,
};
pub use state::{PrinterStateMachine, StateChange};
