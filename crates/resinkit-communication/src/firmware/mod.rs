//! Firmware implementations
//!
//! Supported controllers:
//! - Chitu: resin printer mainboards (ChiTu / CBD / ZWLF)

pub mod chitu;
pub mod status_poller;

pub use chitu::{ChituController, ControllerConfig};
pub use status_poller::{PollTarget, PollerConfig, StatusPoller};
