//! Cartridge programmer driver.
//!
//! [`Programmer`] speaks the command/acknowledgment protocol to the
//! programmer firmware: one handshake, one erase command per sector, then
//! one write command per chunk. Every command waits for its acknowledgment
//! before the next one is sent, and the first failure ends the run.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cartflash::{CartProfile, NativePort, Programmer, SerialConfig, SourceImage};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let profile = CartProfile::Cart8K.device_profile();
//!     let image = SourceImage::load_for("multicart.bin", &profile)?;
//!
//!     let port = NativePort::open(&SerialConfig::new("/dev/ttyACM0"))?;
//!     let mut programmer = Programmer::new(port, profile);
//!
//!     programmer.await_ready()?;
//!     programmer.erase_all(|p| println!("{p}"))?;
//!     programmer.write_image(image.as_bytes(), |p| println!("{p}"))?;
//!     Ok(())
//! }
//! ```

use crate::error::{Error, Result};
use crate::port::Port;
use crate::progress::Progress;
use crate::protocol::{Acknowledgment, Command, READY_TOKEN, read_line};
use crate::target::DeviceProfile;
use log::{debug, info, trace, warn};
use std::time::Duration;

/// Cartridge programmer over an exclusively owned port.
///
/// The port is closed when the programmer is dropped.
pub struct Programmer<P: Port> {
    port: P,
    profile: DeviceProfile,
    ack_timeout: Duration,
    abort_check: Box<dyn Fn() -> bool + Send>,
}

impl<P: Port> Programmer<P> {
    /// Create a programmer on an already opened (and settled) port.
    ///
    /// The acknowledgment timeout starts out as the port's own timeout.
    pub fn new(port: P, profile: DeviceProfile) -> Self {
        let ack_timeout = port.timeout();
        Self {
            port,
            profile,
            ack_timeout,
            abort_check: Box::new(crate::is_interrupted_requested),
        }
    }

    /// Set how long to wait for each acknowledgment line.
    #[must_use]
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Replace the abort check polled before every command.
    ///
    /// Defaults to the library-wide interrupt checker registered with
    /// [`crate::set_interrupt_checker`].
    #[must_use]
    pub fn with_abort_check<F>(mut self, check: F) -> Self
    where
        F: Fn() -> bool + Send + 'static,
    {
        self.abort_check = Box::new(check);
        self
    }

    /// Cartridge geometry this programmer was created for.
    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Wait for the device's `READY` line.
    ///
    /// Reads exactly one line. Anything other than `READY`, including
    /// silence until the timeout, is a protocol mismatch.
    pub fn await_ready(&mut self) -> Result<()> {
        info!("Waiting for programmer on {}...", self.port.name());

        let got = match read_line(&mut self.port, self.ack_timeout) {
            Ok(line) => line
                .trim()
                .to_string(),
            Err(Error::Timeout(msg)) => {
                debug!("Handshake timed out: {msg}");
                String::new()
            },
            Err(e) => return Err(e),
        };

        if got == READY_TOKEN {
            info!("Programmer is ready");
            Ok(())
        } else {
            Err(Error::Protocol {
                expected: READY_TOKEN,
                got,
            })
        }
    }

    /// Erase every sector in ascending order.
    ///
    /// Stops at the first sector the device does not acknowledge; nothing
    /// is retried.
    pub fn erase_all<F>(&mut self, mut progress: F) -> Result<()>
    where
        F: FnMut(Progress),
    {
        let profile = self.profile;
        let total = profile.sector_count();
        info!("Erasing chip ({total} sectors)...");

        for sector in profile.sectors() {
            self.check_abort()?;
            self.erase_sector(sector)?;
            progress(Progress::Erased {
                sector: u32::from(sector) + 1,
                total,
            });
        }

        info!("Erase complete");
        Ok(())
    }

    /// Erase a single sector.
    pub fn erase_sector(&mut self, sector: u8) -> Result<()> {
        if u32::from(sector)
            >= self
                .profile
                .sector_count()
        {
            return Err(Error::Config(format!(
                "sector {sector} is outside the {}-sector chip",
                self.profile
                    .sector_count()
            )));
        }

        let command = Command::erase(sector);
        self.send(&command)?;
        match self.read_ack(&command)? {
            Acknowledgment::Ok => {
                debug!("Sector {sector} erased");
                Ok(())
            },
            Acknowledgment::Error(detail) => {
                warn!("Error erasing sector {sector}: '{detail}'");
                Err(Error::Erase { sector, detail })
            },
        }
    }

    /// Write `image` from address 0 in chunks of the profile's chunk size.
    ///
    /// The last chunk may be shorter. An empty image sends nothing.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_image<F>(&mut self, image: &[u8], mut progress: F) -> Result<()>
    where
        F: FnMut(Progress),
    {
        let total = self
            .profile
            .total_size();
        if image.len() as u64 > u64::from(total) {
            return Err(Error::Image(format!(
                "image is {} bytes, larger than the {total}-byte chip",
                image.len()
            )));
        }

        let chunk_size = usize::from(
            self.profile
                .chunk_size(),
        );
        info!(
            "Writing {} bytes in {} chunks...",
            image.len(),
            self.profile
                .chunk_count(image.len())
        );

        let mut address = 0u32;
        for chunk in image.chunks(chunk_size) {
            self.check_abort()?;
            self.write_chunk(address, chunk)?;
            // chunk_size fits in u16
            address += chunk.len() as u32;
            progress(Progress::Written { address, total });
        }

        info!("Write complete");
        Ok(())
    }

    /// Write one chunk at `address`.
    pub fn write_chunk(&mut self, address: u32, chunk: &[u8]) -> Result<()> {
        if chunk.len()
            > usize::from(
                self.profile
                    .chunk_size(),
            )
        {
            return Err(Error::Config(format!(
                "chunk of {} bytes exceeds the {}-byte chunk size",
                chunk.len(),
                self.profile
                    .chunk_size()
            )));
        }
        if u64::from(address) + chunk.len() as u64
            > u64::from(
                self.profile
                    .total_size(),
            )
        {
            return Err(Error::Config(format!(
                "chunk at 0x{address:06X} runs past the end of the chip"
            )));
        }

        let command = Command::write(address, chunk)?;
        self.send(&command)?;
        match self.read_ack(&command)? {
            Acknowledgment::Ok => Ok(()),
            Acknowledgment::Error(detail) => {
                warn!("Error writing at address 0x{address:06X}: '{detail}'");
                Err(Error::Write { address, detail })
            },
        }
    }

    /// Close the port. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        self.port
            .close()
    }

    fn check_abort(&self) -> Result<()> {
        if (self.abort_check)() {
            warn!("Abort requested, stopping before the next command");
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }

    fn send(&mut self, command: &Command<'_>) -> Result<()> {
        let data = command.encode();
        trace!("-> {command} ({} bytes)", data.len());
        self.port
            .write_all_bytes(&data)
    }

    fn read_ack(&mut self, command: &Command<'_>) -> Result<Acknowledgment> {
        match read_line(&mut self.port, self.ack_timeout) {
            Ok(line) => Ok(Acknowledgment::parse(&line)),
            Err(Error::Timeout(msg)) => Err(Error::Timeout(format!(
                "no acknowledgment for {command}: {msg}"
            ))),
            Err(e) => Err(e),
        }
    }
}

impl<P: Port> Drop for Programmer<P> {
    fn drop(&mut self) {
        if let Err(e) = self
            .port
            .close()
        {
            debug!("Error closing {}: {e}", self.port.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::CartProfile;
    use crate::protocol::line::MAX_LINE_LEN;
    use crate::test_support::{FakeDevice, Received};

    fn small_profile() -> DeviceProfile {
        // 4 sectors of 64 bytes, 16-byte chunks
        DeviceProfile::with_chunk_size(64, 4, 16).unwrap()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| (i * 7 + 3) as u8)
            .collect()
    }

    #[test]
    fn test_await_ready_accepts_token() {
        let (device, log) = FakeDevice::healthy();
        let mut programmer = Programmer::new(device, small_profile());
        programmer
            .await_ready()
            .unwrap();
        assert!(log
            .lock()
            .unwrap()
            .commands
            .is_empty());
    }

    #[test]
    fn test_await_ready_trims_whitespace() {
        let (device, _log) = FakeDevice::new(Some("  READY  "), |_| Some("OK".into()));
        let mut programmer = Programmer::new(device, small_profile());
        assert!(programmer
            .await_ready()
            .is_ok());
    }

    #[test]
    fn test_await_ready_rejects_other_token() {
        for greeting in ["BUSY", "ready", "READY!"] {
            let (device, _log) = FakeDevice::new(Some(greeting), |_| Some("OK".into()));
            let mut programmer = Programmer::new(device, small_profile());
            match programmer.await_ready() {
                Err(Error::Protocol { expected, got }) => {
                    assert_eq!(expected, "READY");
                    assert_eq!(got, greeting);
                },
                other => panic!("unexpected result for {greeting}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_await_ready_timeout_is_protocol_mismatch() {
        let (device, _log) = FakeDevice::new(None, |_| Some("OK".into()));
        let mut programmer = Programmer::new(device, small_profile());
        match programmer.await_ready() {
            Err(Error::Protocol { got, .. }) => assert!(got.is_empty()),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_erase_all_sends_every_sector_in_order() {
        let profile = CartProfile::Cart16K.device_profile();
        let (device, log) = FakeDevice::healthy();
        let mut programmer = Programmer::new(device, profile);
        programmer
            .await_ready()
            .unwrap();

        let mut events = Vec::new();
        programmer
            .erase_all(|p| events.push(p))
            .unwrap();

        let erases = log
            .lock()
            .unwrap()
            .erases();
        assert_eq!(erases, (0..=127).collect::<Vec<u8>>());
        assert_eq!(events.len(), 128);
        assert_eq!(
            events.last(),
            Some(&Progress::Erased {
                sector: 128,
                total: 128
            })
        );
    }

    #[test]
    fn test_erase_all_halts_on_first_failure() {
        let (device, log) = FakeDevice::new(Some("READY"), |cmd| match cmd {
            Received::Erase(2) => Some("ERR sector locked".into()),
            _ => Some("OK".into()),
        });
        let mut programmer = Programmer::new(device, small_profile());
        programmer
            .await_ready()
            .unwrap();

        let mut events = 0;
        match programmer.erase_all(|_| events += 1) {
            Err(Error::Erase { sector, detail }) => {
                assert_eq!(sector, 2);
                assert_eq!(detail, "ERR sector locked");
            },
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(
            log.lock()
                .unwrap()
                .erases(),
            vec![0, 1, 2]
        );
        assert_eq!(events, 2);
    }

    #[test]
    fn test_erase_timeout_names_sector() {
        let (device, log) = FakeDevice::new(Some("READY"), |cmd| match cmd {
            Received::Erase(1) => None,
            _ => Some("OK".into()),
        });
        let mut programmer = Programmer::new(device, small_profile());
        programmer
            .await_ready()
            .unwrap();

        match programmer.erase_all(|_| {}) {
            Err(Error::Timeout(msg)) => assert!(msg.contains("erase sector 1"), "{msg}"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(
            log.lock()
                .unwrap()
                .erases(),
            vec![0, 1]
        );
    }

    #[test]
    fn test_erase_sector_out_of_range() {
        let (device, log) = FakeDevice::healthy();
        let mut programmer = Programmer::new(device, small_profile());
        assert!(matches!(
            programmer.erase_sector(4),
            Err(Error::Config(_))
        ));
        assert!(log
            .lock()
            .unwrap()
            .commands
            .is_empty());
    }

    #[test]
    fn test_write_image_chunks_and_reassembles() {
        let profile = small_profile();
        let image = pattern(256);
        let (device, log) = FakeDevice::healthy();
        let mut programmer = Programmer::new(device, profile);
        programmer
            .await_ready()
            .unwrap();

        let mut last = None;
        programmer
            .write_image(&image, |p| last = Some(p))
            .unwrap();

        let writes = log
            .lock()
            .unwrap()
            .writes();
        assert_eq!(writes.len(), 16);
        let addresses: Vec<u32> = writes
            .iter()
            .map(|(a, _)| *a)
            .collect();
        assert_eq!(addresses, (0..16).map(|i| i * 16).collect::<Vec<u32>>());

        let rebuilt: Vec<u8> = writes
            .into_iter()
            .flat_map(|(_, d)| d)
            .collect();
        assert_eq!(rebuilt, image);
        assert_eq!(
            last.map(|p| p.percent()),
            Some(100.0)
        );
    }

    #[test]
    fn test_write_image_short_last_chunk() {
        let profile = small_profile();
        let image = pattern(37);
        let (device, log) = FakeDevice::healthy();
        let mut programmer = Programmer::new(device, profile);
        programmer
            .await_ready()
            .unwrap();
        programmer
            .write_image(&image, |_| {})
            .unwrap();

        let writes = log
            .lock()
            .unwrap()
            .writes();
        let lengths: Vec<usize> = writes
            .iter()
            .map(|(_, d)| d.len())
            .collect();
        assert_eq!(lengths, vec![16, 16, 5]);
        assert_eq!(writes[2].0, 32);
        assert_eq!(lengths.iter().sum::<usize>(), 37);
    }

    #[test]
    fn test_write_image_empty_sends_nothing() {
        let (device, log) = FakeDevice::healthy();
        let mut programmer = Programmer::new(device, small_profile());
        let mut events = 0;
        programmer
            .write_image(&[], |_| events += 1)
            .unwrap();
        assert!(log
            .lock()
            .unwrap()
            .commands
            .is_empty());
        assert_eq!(events, 0);
    }

    #[test]
    fn test_write_image_rejects_oversized_image() {
        let (device, log) = FakeDevice::healthy();
        let mut programmer = Programmer::new(device, small_profile());
        assert!(matches!(
            programmer.write_image(&pattern(257), |_| {}),
            Err(Error::Image(_))
        ));
        assert!(log
            .lock()
            .unwrap()
            .commands
            .is_empty());
    }

    #[test]
    fn test_write_failure_reports_address() {
        let (device, log) = FakeDevice::new(Some("READY"), |cmd| match cmd {
            Received::Write { address: 48, .. } => Some("WRITE FAIL".into()),
            _ => Some("OK".into()),
        });
        let mut programmer = Programmer::new(device, small_profile());
        programmer
            .await_ready()
            .unwrap();

        match programmer.write_image(&pattern(256), |_| {}) {
            Err(Error::Write { address, detail }) => {
                assert_eq!(address, 48);
                assert_eq!(detail, "WRITE FAIL");
            },
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(
            log.lock()
                .unwrap()
                .writes()
                .len(),
            4
        );
    }

    #[test]
    fn test_write_chunk_bounds() {
        let (device, log) = FakeDevice::healthy();
        let mut programmer = Programmer::new(device, small_profile());
        programmer
            .await_ready()
            .unwrap();
        assert!(programmer
            .write_chunk(0, &[0; 17])
            .is_err());
        assert!(programmer
            .write_chunk(250, &[0; 16])
            .is_err());
        assert!(programmer
            .write_chunk(240, &[0; 16])
            .is_ok());
        assert_eq!(
            log.lock()
                .unwrap()
                .writes()
                .len(),
            1
        );
    }

    #[test]
    fn test_long_erase_reply_keeps_sector_and_text() {
        let (device, log) = FakeDevice::new(Some("READY"), |cmd| match cmd {
            Received::Erase(1) => Some("E".repeat(300)),
            _ => Some("OK".into()),
        });
        let mut programmer = Programmer::new(device, small_profile());
        programmer
            .await_ready()
            .unwrap();

        match programmer.erase_all(|_| {}) {
            Err(Error::Erase { sector, detail }) => {
                assert_eq!(sector, 1);
                assert_eq!(detail, "E".repeat(MAX_LINE_LEN));
            },
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(
            log.lock()
                .unwrap()
                .erases(),
            vec![0, 1]
        );
    }

    #[test]
    fn test_long_write_reply_keeps_address() {
        let (device, _log) = FakeDevice::new(Some("READY"), |cmd| match cmd {
            Received::Write { address: 16, .. } => Some("W".repeat(1000)),
            _ => Some("OK".into()),
        });
        let mut programmer = Programmer::new(device, small_profile());
        programmer
            .await_ready()
            .unwrap();

        match programmer.write_image(&pattern(64), |_| {}) {
            Err(Error::Write { address, detail }) => {
                assert_eq!(address, 16);
                assert_eq!(detail.len(), MAX_LINE_LEN);
            },
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_long_greeting_is_protocol_mismatch() {
        let greeting = "R".repeat(300);
        let (device, log) = FakeDevice::new(Some(&greeting), |_| Some("OK".into()));
        let mut programmer = Programmer::new(device, small_profile());

        match programmer.await_ready() {
            Err(Error::Protocol { expected, got }) => {
                assert_eq!(expected, "READY");
                assert_eq!(got, "R".repeat(MAX_LINE_LEN));
            },
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(log
            .lock()
            .unwrap()
            .commands
            .is_empty());
    }

    #[test]
    fn test_abort_check_stops_between_commands() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let polls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&polls);
        let (device, log) = FakeDevice::healthy();
        let mut programmer = Programmer::new(device, small_profile())
            .with_abort_check(move || counter.fetch_add(1, Ordering::SeqCst) >= 2);
        programmer
            .await_ready()
            .unwrap();

        assert!(matches!(
            programmer.erase_all(|_| {}),
            Err(Error::Interrupted)
        ));
        assert_eq!(
            log.lock()
                .unwrap()
                .erases(),
            vec![0, 1]
        );
    }

    #[test]
    fn test_drop_closes_port() {
        let (device, log) = FakeDevice::healthy();
        {
            let _programmer = Programmer::new(device, small_profile());
        }
        assert!(
            log.lock()
                .unwrap()
                .closed
        );
    }
}
