//! TCP transport bounded by one deadline for the whole dial and handshake.
//!
//! Socket timeouts only bound a single `read` or `write`. [`TimedStream`]
//! re-arms them with the time left before every call, so a peer that trickles
//! bytes cannot keep the handshake alive past the deadline.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use crate::error::is_timeout_kind;

/// A point in time derived from the connect timeout.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Deadline {
        Deadline {
            at: Instant::now() + budget,
            budget,
        }
    }

    /// Time left, or `None` once the deadline has passed.
    pub fn remaining(&self) -> Option<Duration> {
        let now = Instant::now();
        if now >= self.at {
            None
        } else {
            Some(self.at - now)
        }
    }

    /// The full timeout this deadline was created with.
    pub fn budget(&self) -> Duration {
        self.budget
    }
}

fn expired() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded")
}

/// A connected socket whose I/O fails with `TimedOut` after the deadline.
pub struct TimedStream {
    inner: TcpStream,
    deadline: Option<Deadline>,
}

impl TimedStream {
    pub fn new(inner: TcpStream, deadline: Deadline) -> TimedStream {
        TimedStream {
            inner,
            deadline: Some(deadline),
        }
    }

    pub fn get_ref(&self) -> &TcpStream {
        &self.inner
    }

    /// Stops enforcing the deadline; each call is bounded by the full
    /// timeout again.
    pub fn clear_deadline(&mut self) -> io::Result<()> {
        if let Some(deadline) = self.deadline.take() {
            self.inner.set_read_timeout(Some(deadline.budget()))?;
            self.inner.set_write_timeout(Some(deadline.budget()))?;
        }
        Ok(())
    }

    fn arm_read(&self) -> io::Result<()> {
        match self.deadline {
            Some(deadline) => {
                let left = deadline.remaining().ok_or_else(expired)?;
                self.inner.set_read_timeout(Some(left))
            }
            None => Ok(()),
        }
    }

    fn arm_write(&self) -> io::Result<()> {
        match self.deadline {
            Some(deadline) => {
                let left = deadline.remaining().ok_or_else(expired)?;
                self.inner.set_write_timeout(Some(left))
            }
            None => Ok(()),
        }
    }

    // An expired socket timeout is reported as WouldBlock on unix, which
    // OpenSSL would treat as retryable.
    fn map_timeout(&self, e: io::Error) -> io::Error {
        if self.deadline.is_some() && is_timeout_kind(e.kind()) {
            expired()
        } else {
            e
        }
    }
}

impl Read for TimedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.arm_read()?;
        self.inner.read(buf).map_err(|e| self.map_timeout(e))
    }
}

impl Write for TimedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.arm_write()?;
        self.inner.write(buf).map_err(|e| self.map_timeout(e))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
