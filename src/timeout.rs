//! Timeouts and the small enumerations used by io calls.

use std::time::Duration;

use crate::{Error, Result};

/// How long an operation may wait.
///
/// The numeric form follows the classic convention: `-1` waits forever,
/// `0` does not wait and any positive value is a deadline in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Return immediately with whatever is available.
    NoWait,
    /// Block until the operation completes.
    Forever,
    /// Wait at most this many milliseconds.
    Millis(u32),
}

impl Timeout {
    /// Deadline timeout; `0` collapses to [`Timeout::NoWait`].
    pub fn millis(ms: u32) -> Self {
        if ms == 0 {
            Timeout::NoWait
        } else {
            Timeout::Millis(ms)
        }
    }

    /// Value as passed to `poll(2)`.
    pub(crate) fn as_poll_timeout(&self) -> libc::c_int {
        match self {
            Timeout::NoWait => 0,
            Timeout::Forever => -1,
            Timeout::Millis(ms) => (*ms).min(libc::c_int::MAX as u32) as libc::c_int,
        }
    }

    pub(crate) fn as_duration(&self) -> Option<Duration> {
        match self {
            Timeout::NoWait => Some(Duration::ZERO),
            Timeout::Forever => None,
            Timeout::Millis(ms) => Some(Duration::from_millis(*ms as u64)),
        }
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Timeout::NoWait
    }
}

impl TryFrom<i32> for Timeout {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            -1 => Ok(Timeout::Forever),
            0 => Ok(Timeout::NoWait),
            ms if ms > 0 => Ok(Timeout::Millis(ms as u32)),
            _ => Err(Error::InvalidArgument("timeout must be -1, 0 or positive")),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(value: Duration) -> Self {
        Timeout::millis(value.as_millis().min(u32::MAX as u128) as u32)
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(value: Option<Duration>) -> Self {
        match value {
            Some(duration) => duration.into(),
            None => Timeout::Forever,
        }
    }
}

/// Blocking behaviour of [`write`](crate::Socket::write).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Block until the whole buffer sits in the kernel send queue.
    WaitQueued,
    /// Queue what fits and return.
    #[default]
    DontWait,
}

/// Event class for [`wait_event`](crate::wait_event).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitEvent {
    /// Data available to read.
    Read,
    /// Room in the write queue.
    Write,
    /// Either of the above.
    ReadWrite,
}

impl WaitEvent {
    pub(crate) fn poll_events(&self) -> libc::c_short {
        match self {
            WaitEvent::Read => libc::POLLIN,
            WaitEvent::Write => libc::POLLOUT,
            WaitEvent::ReadWrite => libc::POLLIN | libc::POLLOUT,
        }
    }
}

/// Kernel queue selector for buffer length get/set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Send,
    Receive,
}

impl BufferKind {
    pub(crate) fn sockopt(&self) -> libc::c_int {
        match self {
            BufferKind::Send => libc::SO_SNDBUF,
            BufferKind::Receive => libc::SO_RCVBUF,
        }
    }
}

/// Descriptor-wide blocking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    Blocking,
    NonBlocking,
}
