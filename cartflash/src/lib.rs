//! # cartflash
//!
//! A library for programming flash cartridges through a serial-attached
//! programmer board.
//!
//! The programmer firmware speaks a small line-acknowledged protocol:
//!
//! - the device greets with `READY` once it has reset
//! - `E` + sector index erases one 4 KiB sector
//! - `W` + address + length + payload writes one chunk
//! - every command is answered with a single `OK` line (anything else is a failure)
//!
//! ## Cartridge profiles
//!
//! - 8K-class: 256 KiB, 64 sectors
//! - 16K-class: 512 KiB, 128 sectors
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use cartflash::{CartProfile, SerialConfig, SourceImage};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let profile = CartProfile::Cart8K.device_profile();
//!     let image = SourceImage::load_for("multicart.bin", &profile)?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let config = SerialConfig::new("/dev/ttyACM0");
//!         cartflash::session::flash(&config, profile, &image, |p| println!("{p}"))?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod device;
pub mod error;
pub mod image;
pub mod port;
pub mod progress;
pub mod protocol;
pub mod session;
pub mod target;

#[cfg(test)]
mod test_support;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications). Only the first
/// registration takes effect.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    device::{DetectedPort, DeviceKind, detect_ports, detect_programmer_ports, format_port_list},
    error::{Error, Result},
    image::SourceImage,
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    progress::Progress,
    protocol::{Acknowledgment, Command},
    session::{Phase, Session, TransferState},
    target::{CHUNK_SIZE, CartProfile, DeviceProfile, Programmer},
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_checker_default_false() {
        assert!(!is_interrupted_requested());
    }
}
