//! Transfer sessions.
//!
//! A session is one complete handshake, erase, write sequence on a single
//! connection:
//!
//! ```text
//! AwaitingReady -> Erasing(0..n) -> Writing(0..size) -> Done
//!       \               \                 \
//!        +---------------+-----------------+--> Failed(reason)
//! ```
//!
//! Any failure is final. The device has no notion of resuming, so a failed
//! session has to be started again from the handshake, with a full erase.

use {
    crate::{
        error::{Error, Result},
        image::SourceImage,
        port::Port,
        progress::Progress,
        target::{DeviceProfile, Programmer},
    },
    log::{debug, error, info},
    std::{fmt, time::Duration},
};

/// Where a session currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the device's `READY` line.
    AwaitingReady,
    /// Erasing; `next_sector` is the next sector to erase.
    Erasing {
        /// Next sector index.
        next_sector: u32,
    },
    /// Writing; `next_address` is the address of the next chunk.
    Writing {
        /// Next chunk address.
        next_address: u32,
    },
    /// The whole image was written.
    Done,
    /// The session stopped with an error.
    Failed(String),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingReady => write!(f, "awaiting ready"),
            Self::Erasing { next_sector } => write!(f, "erasing (next sector {next_sector})"),
            Self::Writing { next_address } => {
                write!(f, "writing (next address 0x{next_address:06X})")
            },
            Self::Done => write!(f, "done"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Mutable progress of one session.
///
/// Only moves forward. Once `Done` or `Failed`, further transitions are
/// ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferState {
    phase: Phase,
    image_cursor: usize,
}

impl Default for TransferState {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferState {
    /// Fresh state, waiting for the handshake.
    pub fn new() -> Self {
        Self {
            phase: Phase::AwaitingReady,
            image_cursor: 0,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Bytes of the image acknowledged by the device so far.
    pub fn image_cursor(&self) -> usize {
        self.image_cursor
    }

    /// Whether the session has reached `Done` or `Failed`.
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Done | Phase::Failed(_))
    }

    fn begin_erase(&mut self) {
        if self.phase == Phase::AwaitingReady {
            self.phase = Phase::Erasing { next_sector: 0 };
        }
    }

    fn sector_erased(&mut self, erased: u32) {
        if let Phase::Erasing { next_sector } = &mut self.phase {
            *next_sector = (*next_sector).max(erased);
        }
    }

    fn begin_write(&mut self) {
        if matches!(self.phase, Phase::Erasing { .. }) {
            self.phase = Phase::Writing { next_address: 0 };
        }
    }

    fn chunk_written(&mut self, address: u32) {
        if let Phase::Writing { next_address } = &mut self.phase {
            *next_address = (*next_address).max(address);
            self.image_cursor = *next_address as usize;
        }
    }

    fn finish(&mut self) {
        if matches!(self.phase, Phase::Writing { .. }) {
            self.phase = Phase::Done;
        }
    }

    fn fail(&mut self, reason: String) {
        if !self.is_finished() {
            self.phase = Phase::Failed(reason);
        }
    }

    fn observe(&mut self, progress: Progress) {
        match progress {
            Progress::Ready => {},
            Progress::Erased { sector, .. } => self.sector_erased(sector),
            Progress::Written { address, .. } => self.chunk_written(address),
        }
    }
}

/// One handshake-erase-write run over an exclusively owned port.
pub struct Session<P: Port> {
    programmer: Programmer<P>,
    state: TransferState,
}

impl<P: Port> Session<P> {
    /// Start a session on an opened port.
    pub fn new(port: P, profile: DeviceProfile) -> Self {
        Self::from_programmer(Programmer::new(port, profile))
    }

    /// Start a session around a configured programmer.
    pub fn from_programmer(programmer: Programmer<P>) -> Self {
        Self {
            programmer,
            state: TransferState::new(),
        }
    }

    /// Set how long to wait for each acknowledgment line.
    #[must_use]
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.programmer = self
            .programmer
            .with_ack_timeout(timeout);
        self
    }

    /// Replace the abort check polled before every command.
    #[must_use]
    pub fn with_abort_check<F>(mut self, check: F) -> Self
    where
        F: Fn() -> bool + Send + 'static,
    {
        self.programmer = self
            .programmer
            .with_abort_check(check);
        self
    }

    /// Current state.
    pub fn state(&self) -> &TransferState {
        &self.state
    }

    /// Cartridge geometry of this session.
    pub fn profile(&self) -> &DeviceProfile {
        self.programmer
            .profile()
    }

    /// Program `image` onto the cartridge.
    ///
    /// The image is checked against the profile before anything is sent.
    /// The port is closed when this returns, whatever the outcome, so a
    /// session runs at most once.
    pub fn run<F>(&mut self, image: &SourceImage, mut progress: F) -> Result<()>
    where
        F: FnMut(Progress),
    {
        if self.state.phase() != &Phase::AwaitingReady {
            return Err(Error::Config(format!(
                "session already used (state: {})",
                self.state.phase()
            )));
        }

        let result = self.execute(image, &mut progress);

        if let Err(e) = &result {
            error!("Session failed: {e}");
            self.state.fail(e.to_string());
        }
        if let Err(e) = self.programmer.close() {
            debug!("Error closing port: {e}");
        }

        result
    }

    fn execute(&mut self, image: &SourceImage, progress: &mut dyn FnMut(Progress)) -> Result<()> {
        let Self { programmer, state } = self;
        let profile = *programmer.profile();
        image.validate(&profile)?;

        programmer.await_ready()?;
        progress(Progress::Ready);

        state.begin_erase();
        programmer.erase_all(|p| {
            state.observe(p);
            progress(p);
        })?;

        state.begin_write();
        programmer.write_image(image.as_bytes(), |p| {
            state.observe(p);
            progress(p);
        })?;

        state.finish();
        info!("Cartridge programmed ({profile})");
        Ok(())
    }
}

/// Program a cartridge through a native serial port.
///
/// The image is validated before the port is opened. Opening waits for
/// `config.settle` so the device can finish its reset.
#[cfg(feature = "native")]
pub fn flash<F>(
    config: &crate::port::SerialConfig,
    profile: DeviceProfile,
    image: &SourceImage,
    progress: F,
) -> Result<TransferState>
where
    F: FnMut(Progress),
{
    image.validate(&profile)?;

    let port = crate::port::NativePort::open(config)?;
    let mut session = Session::new(port, profile).with_ack_timeout(config.timeout);
    session.run(image, progress)?;
    Ok(session
        .state()
        .clone())
}
