//! Error types for cartflash.

use std::io;
use thiserror::Error;

/// Result type for cartflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for cartflash operations.
///
/// Every variant is terminal for a transfer session: nothing is retried, and
/// a failed session has to be restarted from the handshake.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port read/write, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The endpoint is missing or could not be opened.
    #[error("Cannot open {port}: {reason}")]
    Connection {
        /// Endpoint name (e.g. "/dev/ttyACM0").
        port: String,
        /// Reason reported by the operating system.
        reason: String,
    },

    /// No acknowledgment arrived within the read deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The device sent something other than the expected token.
    #[error("Protocol error: expected '{expected}', got '{got}'")]
    Protocol {
        /// Token that was expected.
        expected: &'static str,
        /// Trimmed line actually received (empty on timeout).
        got: String,
    },

    /// The device reported a failure erasing a sector.
    #[error("Erase failed at sector {sector}: device replied '{detail}'")]
    Erase {
        /// Index of the failing sector.
        sector: u8,
        /// Text the device sent instead of `OK`.
        detail: String,
    },

    /// The device reported a failure writing a chunk.
    #[error("Write failed at address 0x{address:06X}: device replied '{detail}'")]
    Write {
        /// Destination address of the failing chunk.
        address: u32,
        /// Text the device sent instead of `OK`.
        detail: String,
    },

    /// Source image missing or not matching the profile.
    #[error("Image error: {0}")]
    Image(String),

    /// Invalid device geometry.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The embedding application requested an abort.
    #[error("Interrupted")]
    Interrupted,
}
