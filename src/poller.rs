//! Readiness waits over one or many sockets, built on `poll(2)`.

use std::{
    os::fd::RawFd,
    time::{Duration, Instant},
};

use errno::errno;

use crate::{Error, Handle, Result, Socket, Timeout, WaitEvent};

/// Outcome of a single `poll(2)` round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    Ready,
    TimedOut,
    Interrupted,
}

pub(crate) fn poll_fd(fd: RawFd, events: libc::c_short, timeout: Timeout) -> Result<Readiness> {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };

    poll_fds(std::slice::from_mut(&mut pfd), timeout)
}

fn poll_fds(fds: &mut [libc::pollfd], timeout: Timeout) -> Result<Readiness> {
    let ret = unsafe {
        libc::poll(
            fds.as_mut_ptr(),
            fds.len() as libc::nfds_t,
            timeout.as_poll_timeout(),
        )
    };

    if ret < 0 {
        let e = errno();

        if e.0 == libc::EINTR {
            log::trace!(target: "socklib", "poll interrupted by signal");
            return Ok(Readiness::Interrupted);
        }

        return Err(Error::from_raw_os_error("poll", e.0));
    }

    if ret == 0 {
        Ok(Readiness::TimedOut)
    } else {
        Ok(Readiness::Ready)
    }
}

/// Absolute deadline for `timeout`, `None` when waiting forever.
fn deadline_of(timeout: Timeout) -> Option<Instant> {
    timeout.as_duration().map(|d| Instant::now() + d)
}

/// Time left until `deadline`, rounded up to whole milliseconds.
pub(crate) fn remaining_timeout(deadline: Option<Instant>) -> Timeout {
    match deadline {
        None => Timeout::Forever,
        Some(deadline) => Timeout::millis(ceil_millis(
            deadline.saturating_duration_since(Instant::now()),
        )),
    }
}

fn ceil_millis(duration: Duration) -> u32 {
    let ms = (duration.as_micros() + 999) / 1000;

    ms.min(u32::MAX as u128) as u32
}

impl Handle {
    /// Wait until data is available to read.
    ///
    /// Returns the milliseconds left of `timeout` when data arrived, or 0 if
    /// the wait timed out. A ready socket never reports 0: with
    /// [`Timeout::NoWait`], [`Timeout::Forever`] or a deadline that just ran
    /// out the result is 1.
    pub fn wait_data(&self, timeout: Timeout) -> Result<u32> {
        let fd = self.check()?;

        let deadline = deadline_of(timeout);

        loop {
            match poll_fd(fd, libc::POLLIN, remaining_timeout(deadline))? {
                Readiness::Interrupted => continue,
                Readiness::TimedOut => return Ok(0),
                Readiness::Ready => {
                    let remaining = match remaining_timeout(deadline) {
                        Timeout::Millis(ms) => ms,
                        _ => 1,
                    };

                    log::trace!(target: "socklib", "fd({}) data ready, remaining({}ms)", fd, remaining);

                    return Ok(remaining.max(1));
                }
            }
        }
    }
}

/// Wait for `event` on any of `sockets`.
///
/// Returns the index of the first socket, in slice order, whose requested
/// event fired, or `None` on timeout. A socket reporting only a hang-up or
/// error condition is not returned and does not end the wait early. When several sockets become ready
/// together only the first is reported; rotate the slice for fairness.
pub fn wait_event(
    event: WaitEvent,
    timeout: Timeout,
    sockets: &[&dyn Socket],
) -> Result<Option<usize>> {
    if sockets.is_empty() {
        return Ok(None);
    }

    let events = event.poll_events();

    let mut fds = sockets
        .iter()
        .map(|socket| {
            Ok(libc::pollfd {
                fd: socket.handle().check()?,
                events,
                revents: 0,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let deadline = deadline_of(timeout);

    loop {
        match poll_fds(&mut fds, remaining_timeout(deadline))? {
            Readiness::Interrupted => continue,
            Readiness::TimedOut => return Ok(None),
            Readiness::Ready => {
                if let Some(index) = fds.iter().position(|pfd| pfd.revents & events != 0) {
                    return Ok(Some(index));
                }

                // Only unrequested conditions (POLLHUP, POLLERR) fired. Those
                // are level triggered, so stop watching the reporting sockets
                // and keep waiting for the rest until the deadline.
                for pfd in fds.iter_mut() {
                    if pfd.revents != 0 {
                        log::trace!(target: "socklib", "fd({}) revents({:#x}) ignored", pfd.fd, pfd.revents);

                        pfd.fd = -1;
                    }

                    pfd.revents = 0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WriteMode;

    #[test]
    fn test_ceil_millis() {
        assert_eq!(ceil_millis(Duration::ZERO), 0);
        assert_eq!(ceil_millis(Duration::from_micros(1)), 1);
        assert_eq!(ceil_millis(Duration::from_micros(1000)), 1);
        assert_eq!(ceil_millis(Duration::from_micros(1001)), 2);
    }

    #[test]
    fn test_wait_data_no_wait_returns_immediately() {
        let (a, _b) = Handle::pair(libc::AF_UNIX, libc::SOCK_STREAM).unwrap();

        let start = Instant::now();

        assert_eq!(a.wait_data(Timeout::NoWait).unwrap(), 0);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_wait_data_reports_remaining_time() {
        let (a, b) = Handle::pair(libc::AF_UNIX, libc::SOCK_STREAM).unwrap();

        b.write(b"x", WriteMode::WaitQueued).unwrap();

        let remaining = a.wait_data(Timeout::Millis(1000)).unwrap();

        assert!(remaining > 0 && remaining <= 1000);

        assert_eq!(a.wait_data(Timeout::NoWait).unwrap(), 1);
        assert_eq!(a.wait_data(Timeout::Forever).unwrap(), 1);
    }

    #[test]
    fn test_wait_data_on_invalid_handle() {
        let handle = Handle::default();

        assert!(matches!(
            handle.wait_data(Timeout::NoWait),
            Err(Error::InvalidState)
        ));
    }

    #[test]
    fn test_wait_event_ignores_unrequested_conditions() {
        _ = pretty_env_logger::try_init();

        // an unconnected TCP socket polls as POLLOUT | POLLHUP
        let unconnected = Handle::open(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
        let (idle, _peer) = Handle::pair(libc::AF_UNIX, libc::SOCK_STREAM).unwrap();

        let start = Instant::now();

        assert_eq!(
            wait_event(
                WaitEvent::Read,
                Timeout::Millis(300),
                &[&unconnected as &dyn Socket, &idle]
            )
            .unwrap(),
            None
        );

        assert!(start.elapsed() >= Duration::from_millis(290));
    }

    #[test]
    fn test_wait_event_ready_after_unrequested_condition() {
        let unconnected = Handle::open(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
        let (reader, writer) = Handle::pair(libc::AF_UNIX, libc::SOCK_STREAM).unwrap();

        let sender = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            writer.write(b"x", WriteMode::WaitQueued).unwrap();
            writer
        });

        assert_eq!(
            wait_event(
                WaitEvent::Read,
                Timeout::Millis(2000),
                &[&unconnected as &dyn Socket, &reader]
            )
            .unwrap(),
            Some(1)
        );

        sender.join().unwrap();
    }

    #[test]
    fn test_wait_event_empty_list() {
        assert_eq!(
            wait_event(WaitEvent::Read, Timeout::Millis(10), &[]).unwrap(),
            None
        );
    }
}
