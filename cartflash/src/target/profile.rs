//! Cartridge geometry.
//!
//! Every supported cartridge is described by one [`DeviceProfile`]. The named
//! [`CartProfile`] table covers the boards in circulation; anything else with
//! uniform sectors can be described with [`DeviceProfile::new`].

use crate::error::{Error, Result};
use std::fmt;

/// Bytes sent per write command.
///
/// The programmer firmware buffers one chunk at a time and there is no
/// negotiation, so this is a protocol constant.
pub const CHUNK_SIZE: u16 = 64;

/// Flash sector size shared by the supported chips.
pub const SECTOR_SIZE: u32 = 4096;

/// Largest sector count addressable by the one-byte sector index.
pub const MAX_SECTORS: u32 = 256;

/// Flash geometry of one cartridge type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceProfile {
    total_size: u32,
    sector_size: u32,
    sector_count: u32,
    chunk_size: u16,
}

impl DeviceProfile {
    /// Describe a chip with `sector_count` sectors of `sector_size` bytes,
    /// written in [`CHUNK_SIZE`] chunks.
    pub fn new(sector_size: u32, sector_count: u32) -> Result<Self> {
        Self::with_chunk_size(sector_size, sector_count, CHUNK_SIZE)
    }

    /// Describe a chip with a non-standard chunk size.
    pub fn with_chunk_size(sector_size: u32, sector_count: u32, chunk_size: u16) -> Result<Self> {
        if sector_size == 0 {
            return Err(Error::Config("sector size must be non-zero".into()));
        }
        if sector_count == 0 || sector_count > MAX_SECTORS {
            return Err(Error::Config(format!(
                "sector count {sector_count} out of range 1..={MAX_SECTORS}"
            )));
        }
        if chunk_size == 0 {
            return Err(Error::Config("chunk size must be non-zero".into()));
        }
        let total_size = sector_size
            .checked_mul(sector_count)
            .ok_or_else(|| {
                Error::Config(format!(
                    "{sector_count} sectors of {sector_size} bytes overflow the 32-bit address space"
                ))
            })?;

        Ok(Self {
            total_size,
            sector_size,
            sector_count,
            chunk_size,
        })
    }

    /// Total flash size in bytes.
    pub fn total_size(&self) -> u32 {
        self.total_size
    }

    /// Size of one erasable sector in bytes.
    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    /// Number of sectors.
    pub fn sector_count(&self) -> u32 {
        self.sector_count
    }

    /// Maximum payload of one write command.
    pub fn chunk_size(&self) -> u16 {
        self.chunk_size
    }

    /// Number of write commands needed for an image of `len` bytes.
    pub fn chunk_count(&self, len: usize) -> usize {
        len.div_ceil(usize::from(self.chunk_size))
    }

    /// Iterate over sector indices in erase order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn sectors(&self) -> impl Iterator<Item = u8> {
        // sector_count <= 256, so every index fits in a byte
        (0..self.sector_count).map(|s| s as u8)
    }
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} KiB ({} x {} B sectors, {} B chunks)",
            self.total_size / 1024,
            self.sector_count,
            self.sector_size,
            self.chunk_size
        )
    }
}

/// Named cartridge profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum CartProfile {
    /// 8K-class multicart: 256 KiB chip.
    #[default]
    Cart8K,
    /// 16K-class multicart: 512 KiB chip.
    Cart16K,
}

impl CartProfile {
    /// All named profiles.
    pub const ALL: [Self; 2] = [Self::Cart8K, Self::Cart16K];

    /// Geometry of this profile.
    #[must_use]
    pub fn device_profile(&self) -> DeviceProfile {
        let sector_count = match self {
            Self::Cart8K => 64,
            Self::Cart16K => 128,
        };
        DeviceProfile {
            total_size: SECTOR_SIZE * sector_count,
            sector_size: SECTOR_SIZE,
            sector_count,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Short name used on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cart8K => "8k",
            Self::Cart16K => "16k",
        }
    }

    /// Image file name used when none is given.
    pub fn default_image(&self) -> &'static str {
        match self {
            Self::Cart8K => "multicart.bin",
            Self::Cart16K => "multicart_16k.bin",
        }
    }

    /// Get the profile from a string name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name
            .to_lowercase()
            .as_str()
        {
            "8k" | "8k-class" | "256k" => Some(Self::Cart8K),
            "16k" | "16k-class" | "512k" => Some(Self::Cart16K),
            _ => None,
        }
    }
}

impl fmt::Display for CartProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cart8K => write!(f, "8K-class"),
            Self::Cart16K => write!(f, "16K-class"),
        }
    }
}

impl From<CartProfile> for DeviceProfile {
    fn from(profile: CartProfile) -> Self {
        profile.device_profile()
    }
}
