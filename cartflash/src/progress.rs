//! Progress events emitted while a cartridge is programmed.
//!
//! Events are for display only. The driver never looks at what a callback
//! does with them.

use std::fmt;

/// One step of observable progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The handshake succeeded.
    Ready,
    /// `sector` sectors out of `total` have been erased.
    Erased {
        /// Number of sectors erased so far (1-based).
        sector: u32,
        /// Total number of sectors.
        total: u32,
    },
    /// Everything below `address` has been written.
    Written {
        /// Bytes written so far.
        address: u32,
        /// Flash size the percentage is relative to.
        total: u32,
    },
}

impl Progress {
    /// Completion of the current stage in percent.
    pub fn percent(&self) -> f64 {
        let (done, total) = match *self {
            Self::Ready => return 100.0,
            Self::Erased { sector, total } => (sector, total),
            Self::Written { address, total } => (address, total),
        };
        if total == 0 {
            100.0
        } else {
            f64::from(done) / f64::from(total) * 100.0
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "device ready"),
            Self::Erased { sector, total } => write!(f, "Sector {sector}/{total} erased"),
            Self::Written { .. } => write!(f, "Progress: {:.1}%", self.percent()),
        }
    }
}
