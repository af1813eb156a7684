//! Line-oriented reads from the programmer.
//!
//! The device terminates every reply with a line break. Bytes are read one
//! at a time so nothing past the newline is consumed from the port.

use {
    crate::{
        error::{Error, Result},
        port::Port,
    },
    log::{debug, trace},
    std::{
        io::ErrorKind,
        time::{Duration, Instant},
    },
};

/// Longest line kept; bytes past it are read and dropped.
pub const MAX_LINE_LEN: usize = 256;

/// Read one line, waiting at most `timeout` for the terminating `\n`.
///
/// The returned text has the line terminator (`\n` or `\r\n`) removed and is
/// decoded lossily. A line longer than [`MAX_LINE_LEN`] is still read up to
/// its terminator but only its first [`MAX_LINE_LEN`] bytes are returned.
/// Fails with [`Error::Timeout`] if no complete line arrives in time.
///
/// The port's read timeout is narrowed to the time left before each read and
/// restored afterwards.
pub fn read_line<P: Port + ?Sized>(port: &mut P, timeout: Duration) -> Result<String> {
    let saved = port.timeout();
    let result = read_line_until(port, Instant::now() + timeout, timeout);
    let restored = port.set_timeout(saved);
    let line = result?;
    restored?;
    Ok(line)
}

fn read_line_until<P: Port + ?Sized>(
    port: &mut P,
    deadline: Instant,
    timeout: Duration,
) -> Result<String> {
    let mut line = Vec::new();
    let mut dropped = 0usize;
    let mut buf = [0u8; 1];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::Timeout(format!(
                "no line received within {} ms",
                timeout.as_millis()
            )));
        }
        port.set_timeout(remaining)?;

        match port.read(&mut buf) {
            Ok(0) => {
                return Err(Error::Io(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "port reached end of stream",
                )));
            },
            Ok(_) => {
                if buf[0] == b'\n' {
                    break;
                }
                if line.len() < MAX_LINE_LEN {
                    line.push(buf[0]);
                } else {
                    dropped += 1;
                }
            },
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {},
            Err(e) if e.kind() == ErrorKind::Interrupted => {},
            Err(e) => return Err(Error::Io(e)),
        }
    }

    if dropped > 0 {
        debug!("Reply truncated to {MAX_LINE_LEN} bytes ({dropped} dropped)");
    } else if line.last() == Some(&b'\r') {
        line.pop();
    }

    let text = String::from_utf8_lossy(&line).into_owned();
    trace!("<- {text:?}");
    Ok(text)
}
