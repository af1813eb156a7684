//! Scripted programmer used by the unit tests.
//!
//! The fake decodes every command the host writes, records it, and queues the
//! reply chosen by a responder closure. Returning `None` from the responder
//! leaves the host waiting, which exercises the timeout path.

use {
    crate::{
        error::Result,
        port::Port,
        protocol::{ERASE_TAG, WRITE_TAG},
    },
    std::{
        collections::VecDeque,
        io::{Error as IoError, ErrorKind, Read, Write},
        sync::{Arc, Mutex},
        time::Duration,
    },
};

/// A command as decoded by the fake device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Received {
    Erase(u8),
    Write { address: u32, data: Vec<u8> },
}

/// Everything the fake device observed.
#[derive(Debug, Default)]
pub(crate) struct DeviceLog {
    pub commands: Vec<Received>,
    pub undecodable: Vec<u8>,
    pub closed: bool,
}

impl DeviceLog {
    pub fn erases(&self) -> Vec<u8> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Received::Erase(s) => Some(*s),
                Received::Write { .. } => None,
            })
            .collect()
    }

    pub fn writes(&self) -> Vec<(u32, Vec<u8>)> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Received::Write { address, data } => Some((*address, data.clone())),
                Received::Erase(_) => None,
            })
            .collect()
    }
}

type Responder = Box<dyn FnMut(&Received) -> Option<String> + Send>;

pub(crate) struct FakeDevice {
    rx: VecDeque<u8>,
    pending: Vec<u8>,
    responder: Responder,
    log: Arc<Mutex<DeviceLog>>,
    closed: bool,
    timeout: Duration,
}

impl FakeDevice {
    /// A device that greets with `greeting` and answers with `responder`.
    pub fn new<F>(greeting: Option<&str>, responder: F) -> (Self, Arc<Mutex<DeviceLog>>)
    where
        F: FnMut(&Received) -> Option<String> + Send + 'static,
    {
        let log = Arc::new(Mutex::new(DeviceLog::default()));
        let mut device = Self {
            rx: VecDeque::new(),
            pending: Vec::new(),
            responder: Box::new(responder),
            log: Arc::clone(&log),
            closed: false,
            timeout: Duration::from_millis(20),
        };
        if let Some(line) = greeting {
            device.queue_line(line);
        }
        (device, log)
    }

    /// A healthy device: `READY`, then `OK` to everything.
    pub fn healthy() -> (Self, Arc<Mutex<DeviceLog>>) {
        Self::new(Some("READY"), |_| Some("OK".into()))
    }

    fn queue_line(&mut self, line: &str) {
        self.rx
            .extend(line.as_bytes());
        self.rx
            .extend(b"\r\n");
    }

    fn decode_pending(&mut self) {
        loop {
            let Some(&tag) = self
                .pending
                .first()
            else {
                return;
            };

            let (command, used) = match tag {
                ERASE_TAG if self.pending.len() >= 2 => (Received::Erase(self.pending[1]), 2),
                WRITE_TAG if self.pending.len() >= 7 => {
                    let p = &self.pending;
                    let address = u32::from_le_bytes([p[1], p[2], p[3], p[4]]);
                    let len = usize::from(u16::from_le_bytes([p[5], p[6]]));
                    if p.len() < 7 + len {
                        return;
                    }
                    let data = p[7..7 + len].to_vec();
                    (Received::Write { address, data }, 7 + len)
                },
                ERASE_TAG | WRITE_TAG => return,
                _ => {
                    let garbage: Vec<u8> = self
                        .pending
                        .drain(..)
                        .collect();
                    self.log
                        .lock()
                        .unwrap()
                        .undecodable
                        .extend(garbage);
                    return;
                },
            };

            self.pending
                .drain(..used);
            if let Some(reply) = (self.responder)(&command) {
                self.queue_line(&reply);
            }
            self.log
                .lock()
                .unwrap()
                .commands
                .push(command);
        }
    }
}

impl Read for FakeDevice {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(IoError::new(ErrorKind::NotConnected, "port closed"));
        }
        let n = buf
            .len()
            .min(self.rx.len());
        if n == 0 {
            return Err(IoError::new(ErrorKind::TimedOut, "no data"));
        }
        for b in buf
            .iter_mut()
            .take(n)
        {
            *b = self
                .rx
                .pop_front()
                .unwrap_or_default();
        }
        Ok(n)
    }
}

impl Write for FakeDevice {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(IoError::new(ErrorKind::NotConnected, "port closed"));
        }
        self.pending
            .extend_from_slice(buf);
        self.decode_pending();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Port for FakeDevice {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.rx
            .clear();
        self.pending
            .clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.log
            .lock()
            .unwrap()
            .closed = true;
        Ok(())
    }
}
