//! Line-oriented link abstraction
//!
//! The printer speaks a half-duplex, line-terminated text protocol over a
//! serial device. [`SerialLink`] is the raw byte exchange the driver needs;
//! [`LinkOpener`] creates links so the driver can be run against hardware or
//! against an in-memory double.
//!
//! Text crosses the link as Latin-1: every byte maps to exactly one `char`
//! and back, so firmware noise above 0x7F never causes a decoding fault.

use resinkit_core::Result;
use std::io;
use std::time::{Duration, Instant};

/// Line terminator appended to every command
pub const LINE_TERMINATOR: char = '\n';

/// Parameters for opening a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkParams {
    /// Device path (e.g., "/dev/serial0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Default response timeout
    pub timeout: Duration,
    /// Time the board needs after open before it accepts commands
    pub settle_delay: Duration,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            port: "/dev/serial0".to_string(),
            baud_rate: 115200,
            timeout: Duration::from_secs(5),
            settle_delay: Duration::from_secs(2),
        }
    }
}

/// Raw byte exchange with the printer
pub trait SerialLink: Send {
    /// Whether the underlying device is still open
    fn is_open(&self) -> bool;

    /// Discard unread input and unflushed output
    fn reset_buffers(&mut self) -> io::Result<()>;

    /// Write one line, appending the terminator if absent, and flush
    fn write_line(&mut self, line: &str) -> io::Result<()>;

    /// Accumulate input until a terminator arrives or `deadline` passes.
    ///
    /// A timeout is not an error: whatever arrived (possibly nothing) is
    /// returned.
    fn read_until_terminator(&mut self, deadline: Instant) -> io::Result<String>;

    /// Close the device. Calling it twice is harmless.
    fn close(&mut self);
}

/// Factory for links
pub trait LinkOpener: Send + Sync {
    /// Open a link, waiting out the settle delay before returning it
    fn open(&self, params: &LinkParams) -> Result<Box<dyn SerialLink>>;
}

/// Encode a command line as Latin-1 bytes with a trailing terminator.
///
/// Characters outside Latin-1 cannot be represented on the wire and are
/// dropped.
pub fn encode_line(line: &str) -> Vec<u8> {
    let mut bytes: Vec<u8> = line
        .chars()
        .filter_map(|c| u8::try_from(u32::from(c)).ok())
        .collect();
    if bytes.last() != Some(&(LINE_TERMINATOR as u8)) {
        bytes.push(LINE_TERMINATOR as u8);
    }
    bytes
}

/// Decode Latin-1 bytes; never fails
pub fn decode_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_appends_terminator() {
        assert_eq!(encode_line("M4002"), b"M4002\n".to_vec());
        assert_eq!(encode_line("M4002\n"), b"M4002\n".to_vec());
    }

    #[test]
    fn test_encode_drops_unrepresentable_chars() {
        assert_eq!(encode_line("M23 j\u{2603}ob.ctb"), b"M23 job.ctb\n".to_vec());
        assert_eq!(encode_line("M23 caf\u{e9}"), b"M23 caf\xe9\n".to_vec());
    }

    #[test]
    fn test_decode_preserves_high_bytes() {
        let decoded = decode_bytes(b"ok\xff\x80\n");
        assert_eq!(decoded.chars().count(), 5);
        assert!(decoded.starts_with("ok"));
        assert_eq!(encode_line(&decoded), b"ok\xff\x80\n".to_vec());
    }
}
