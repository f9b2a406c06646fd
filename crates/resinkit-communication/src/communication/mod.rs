//! Transport layer
//!
//! - [`link`]: the line-oriented link traits and wire encoding
//! - [`serial`]: the hardware implementation and port enumeration

pub mod link;
pub mod serial;

pub use link::{decode_bytes, encode_line, LinkOpener, LinkParams, SerialLink, LINE_TERMINATOR};
pub use serial::{list_ports, SerialPortInfo, SerialPortLink, SerialPortOpener};
