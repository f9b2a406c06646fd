//! Error handling for ResinKit
//!
//! Provides the error types shared by every layer below the printer driver:
//! - Connection errors (serial link lifecycle and I/O)
//! - Firmware errors (malformed or unexpected responses)
//!
//! All error types use `thiserror` for ergonomic error handling. The driver
//! converts these into boolean outcomes before they reach its callers.

use thiserror::Error;

/// Connection error type
///
/// Represents errors related to the serial link with the printer board.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// A command was attempted without an open link
    #[error("Printer not connected")]
    NotConnected,

    /// The device path does not exist
    #[error("Port not found: {port}")]
    PortNotFound {
        /// The name of the port that was not found.
        port: String,
    },

    /// The device is held by another process
    #[error("Port already in use: {port}")]
    PortInUse {
        /// The name of the port that is in use.
        port: String,
    },

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Write or read failed on an open link
    #[error("Communication error: {reason}")]
    Communication {
        /// The reason for the failure.
        reason: String,
    },
}

impl ConnectionError {
    /// Wrap an I/O failure that happened during an exchange
    pub fn communication(err: impl std::fmt::Display) -> Self {
        Self::Communication {
            reason: err.to_string(),
        }
    }
}

/// Firmware error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FirmwareError {
    /// Response parsing error
    #[error("Failed to parse firmware response: {reason}")]
    ResponseParse {
        /// The reason the response parsing failed.
        reason: String,
    },
}

/// Main error type for ResinKit
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Firmware error
    #[error(transparent)]
    Firmware(#[from] FirmwareError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{message}")]
    Other {
        /// The error message.
        message: String,
    },
}

impl Error {
    /// Create a generic error from a message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// True when the error means no link was open
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Error::Connection(ConnectionError::NotConnected))
    }
}

/// Result type alias for ResinKit operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        assert_eq!(
            ConnectionError::NotConnected.to_string(),
            "Printer not connected"
        );

        let err = ConnectionError::FailedToOpen {
            port: "/dev/serial0".to_string(),
            reason: "permission denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to open port /dev/serial0: permission denied"
        );
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = ConnectionError::NotConnected.into();
        assert!(err.is_not_connected());

        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_not_connected());
    }

    #[test]
    fn test_transparent_display() {
        let err: Error = ConnectionError::communication("device removed").into();
        assert_eq!(err.to_string(), "Communication error: device removed");
    }
}
