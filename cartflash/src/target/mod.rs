//! Cartridge geometry and the programmer driver.

pub mod flasher;
pub mod profile;

pub use flasher::Programmer;
pub use profile::{CHUNK_SIZE, CartProfile, DeviceProfile, SECTOR_SIZE};
