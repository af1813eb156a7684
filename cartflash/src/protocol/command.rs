//! Programmer command encoding and acknowledgment parsing.
//!
//! ## Command Format
//!
//! ```text
//! Erase:
//! +-----+--------+
//! | TAG | SECTOR |
//! +-----+--------+
//! |  1  |   1    |
//! +-----+--------+
//! | 'E' | index  |
//! +-----+--------+
//!
//! Write:
//! +-----+-----------+----------+-----------------+
//! | TAG |  ADDRESS  |  LENGTH  |     PAYLOAD     |
//! +-----+-----------+----------+-----------------+
//! |  1  | 4 (LE)    | 2 (LE)   |  LENGTH bytes   |
//! +-----+-----------+----------+-----------------+
//! | 'W' | dest addr | len      |  image bytes    |
//! +-----+-----------+----------+-----------------+
//! ```
//!
//! The device answers every command with one line: `OK`, or anything else
//! on failure.

use {
    crate::error::{Error, Result},
    byteorder::{LittleEndian, WriteBytesExt},
    std::fmt,
};

/// Tag byte of the erase command.
pub const ERASE_TAG: u8 = b'E';

/// Tag byte of the write command.
pub const WRITE_TAG: u8 = b'W';

/// Token the device sends once after reset.
pub const READY_TOKEN: &str = "READY";

/// Acknowledgment of a successful command.
pub const ACK_OK: &str = "OK";

/// Bytes of header in front of a write payload.
pub const WRITE_HEADER_LEN: usize = 7;

/// A single host-to-device command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Erase one flash sector.
    Erase {
        /// Sector index.
        sector: u8,
    },
    /// Program `payload` starting at `address`.
    Write {
        /// Destination address in flash.
        address: u32,
        /// Data to program, at most `u16::MAX` bytes.
        payload: &'a [u8],
    },
}

impl<'a> Command<'a> {
    /// Create an erase command.
    pub fn erase(sector: u8) -> Self {
        Self::Erase { sector }
    }

    /// Create a write command, checking that the payload fits the 16-bit
    /// length field and is not empty.
    pub fn write(address: u32, payload: &'a [u8]) -> Result<Self> {
        if payload.is_empty() {
            return Err(Error::Config("write payload must not be empty".into()));
        }
        if payload.len() > usize::from(u16::MAX) {
            return Err(Error::Config(format!(
                "write payload of {} bytes exceeds the 16-bit length field",
                payload.len()
            )));
        }
        Ok(Self::Write { address, payload })
    }

    /// Tag byte identifying the command on the wire.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Erase { .. } => ERASE_TAG,
            Self::Write { .. } => WRITE_TAG,
        }
    }

    /// Total encoded length in bytes.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Erase { .. } => 2,
            Self::Write { payload, .. } => WRITE_HEADER_LEN + payload.len(),
        }
    }

    /// Encode the command into its wire representation.
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(self.tag());

        match *self {
            Self::Erase { sector } => buf.push(sector),
            Self::Write { address, payload } => {
                buf.write_u32::<LittleEndian>(address)
                    .unwrap();
                // Length checked in `Command::write`
                buf.write_u16::<LittleEndian>(payload.len() as u16)
                    .unwrap();
                buf.extend_from_slice(payload);
            },
        }

        buf
    }
}

impl fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Erase { sector } => write!(f, "erase sector {sector}"),
            Self::Write { address, payload } => {
                write!(f, "write {} bytes at 0x{address:06X}", payload.len())
            },
        }
    }
}

/// Device reply to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgment {
    /// The command succeeded.
    Ok,
    /// The device replied with something else; the text is kept for the user.
    Error(String),
}

impl Acknowledgment {
    /// Parse one received line. Surrounding whitespace is ignored and the
    /// comparison with `OK` is case-sensitive.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line == ACK_OK {
            Self::Ok
        } else {
            Self::Error(line.to_string())
        }
    }

    /// Whether this is a successful acknowledgment.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}
