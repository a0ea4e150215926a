//! Timeout-governed read / write engine.
//!
//! Three read regimes share one entry point:
//!
//! - [`Timeout::NoWait`]: a single non-blocking `recv`, "would block" reads as 0.
//! - [`Timeout::Forever`]: a single `recv(MSG_WAITALL)`.
//! - [`Timeout::Millis`]: accumulate into the buffer until it is full, the
//!   peer closes, or the deadline passes.

use std::{
    os::fd::RawFd,
    time::{Duration, Instant},
};

use errno::errno;
use libc::c_void;

use crate::{
    address::{Address, RawAddress},
    poller::{poll_fd, remaining_timeout, Readiness},
    Error, Handle, Result, Timeout, WriteMode,
};

impl Handle {
    /// Read up to `buf.len()` bytes.
    ///
    /// Returns the number of bytes placed at the front of `buf`; 0 means
    /// nothing arrived in time or the peer closed the connection.
    pub fn read(&self, buf: &mut [u8], timeout: Timeout) -> Result<usize> {
        if buf.is_empty() {
            return Err(Error::InvalidArgument("read buffer is empty"));
        }

        let fd = self.check()?;

        match timeout {
            Timeout::NoWait | Timeout::Millis(0) => {
                match recv(fd, buf, libc::MSG_NOSIGNAL | libc::MSG_DONTWAIT) {
                    Err(err) if err.is_would_block() => Ok(0),
                    other => other,
                }
            }
            Timeout::Forever => recv(fd, buf, libc::MSG_NOSIGNAL | libc::MSG_WAITALL),
            Timeout::Millis(ms) => read_until(fd, buf, Duration::from_millis(ms as u64)),
        }
    }

    /// Queue `buf` for sending.
    ///
    /// With [`WriteMode::DontWait`] the return value may be smaller than
    /// `buf.len()`. `SIGPIPE` is suppressed on every send.
    pub fn write(&self, buf: &[u8], mode: WriteMode) -> Result<usize> {
        if buf.is_empty() {
            return Err(Error::InvalidArgument("write buffer is empty"));
        }

        let fd = self.check()?;

        let flags = match mode {
            WriteMode::WaitQueued => libc::MSG_NOSIGNAL,
            WriteMode::DontWait => libc::MSG_NOSIGNAL | libc::MSG_DONTWAIT,
        };

        let len = unsafe { libc::send(fd, buf.as_ptr() as *const c_void, buf.len(), flags) };

        if len < 0 {
            return Err(Error::last_os_error("send"));
        }

        log::trace!(target: "socklib", "fd({}) send bytes({})", fd, len);

        Ok(len as usize)
    }

    /// Bytes waiting in the receive queue.
    ///
    /// On datagram sockets this is the size of the next datagram. A queued
    /// datagram with an empty payload would make `FIONREAD` report 0 forever,
    /// so a zero result also discards such a datagram if one is present.
    pub fn pending(&self) -> Result<usize> {
        pending(self.check()?)
    }

    /// Receive one datagram, optionally reporting its origin.
    pub(crate) fn recv_from<T: RawAddress>(
        &self,
        buf: &mut [u8],
        flags: libc::c_int,
        origin: Option<&mut Address<T>>,
    ) -> Result<usize> {
        if buf.is_empty() {
            return Err(Error::InvalidArgument("message buffer is empty"));
        }

        let fd = self.check()?;

        let len = match origin {
            Some(origin) => {
                let mut addr_len = origin.size();

                unsafe {
                    libc::recvfrom(
                        fd,
                        buf.as_mut_ptr() as *mut c_void,
                        buf.len(),
                        flags,
                        origin.as_mut_ptr(),
                        &mut addr_len,
                    )
                }
            }
            None => unsafe {
                libc::recvfrom(
                    fd,
                    buf.as_mut_ptr() as *mut c_void,
                    buf.len(),
                    flags,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                )
            },
        };

        if len < 0 {
            return Err(Error::last_os_error("recvfrom"));
        }

        log::trace!(target: "socklib", "fd({}) recvfrom bytes({})", fd, len);

        Ok(len as usize)
    }

    /// Send one datagram to `dest`, or to the connected peer when `None`.
    pub(crate) fn send_to<T: RawAddress>(
        &self,
        buf: &[u8],
        dest: Option<&Address<T>>,
    ) -> Result<usize> {
        if buf.is_empty() {
            return Err(Error::InvalidArgument("message buffer is empty"));
        }

        let fd = self.check()?;

        let (addr, addr_len) = match dest {
            Some(dest) => (dest.as_ptr(), dest.size()),
            None => (std::ptr::null(), 0),
        };

        let len = unsafe {
            libc::sendto(
                fd,
                buf.as_ptr() as *const c_void,
                buf.len(),
                libc::MSG_NOSIGNAL,
                addr,
                addr_len,
            )
        };

        if len < 0 {
            return Err(Error::last_os_error("sendto"));
        }

        log::trace!(target: "socklib", "fd({}) sendto bytes({})", fd, len);

        Ok(len as usize)
    }
}

fn recv(fd: RawFd, buf: &mut [u8], flags: libc::c_int) -> Result<usize> {
    let len = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut c_void, buf.len(), flags) };

    if len < 0 {
        return Err(Error::last_os_error("recv"));
    }

    log::trace!(target: "socklib", "fd({}) recv bytes({})", fd, len);

    Ok(len as usize)
}

fn read_until(fd: RawFd, buf: &mut [u8], timeout: Duration) -> Result<usize> {
    let deadline = Instant::now() + timeout;

    let mut read = 0;

    while read < buf.len() {
        if Instant::now() >= deadline {
            break;
        }

        if pending(fd)? == 0 {
            match poll_fd(fd, libc::POLLIN, remaining_timeout(Some(deadline)))? {
                Readiness::TimedOut => break,
                Readiness::Interrupted => continue,
                Readiness::Ready => {}
            }
        }

        let len = unsafe {
            libc::recv(
                fd,
                buf[read..].as_mut_ptr() as *mut c_void,
                buf.len() - read,
                libc::MSG_NOSIGNAL,
            )
        };

        if len < 0 {
            if errno().0 == libc::EINTR {
                continue;
            }

            return Err(Error::last_os_error("recv"));
        }

        if len == 0 {
            log::trace!(target: "socklib", "fd({}) peer closed", fd);
            break;
        }

        read += len as usize;
    }

    log::trace!(target: "socklib", "fd({}) read bytes({}) of ({})", fd, read, buf.len());

    Ok(read)
}

fn pending(fd: RawFd) -> Result<usize> {
    let mut count: libc::c_int = 0;

    if unsafe { libc::ioctl(fd, libc::FIONREAD as _, &mut count) } < 0 {
        return Err(Error::last_os_error("ioctl(FIONREAD)"));
    }

    if count == 0 {
        unsafe {
            libc::recvfrom(
                fd,
                std::ptr::null_mut(),
                0,
                libc::MSG_DONTWAIT,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            );
        }
    }

    Ok(count as usize)
}

#[cfg(test)]
mod tests {
    use std::{os::fd::AsRawFd, thread, time::Instant};

    use super::*;

    fn stream_pair() -> (Handle, Handle) {
        Handle::pair(libc::AF_UNIX, libc::SOCK_STREAM).unwrap()
    }

    #[test]
    fn test_empty_buffers_rejected() {
        let (a, _b) = stream_pair();

        assert!(matches!(
            a.read(&mut [], Timeout::NoWait),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            a.write(&[], WriteMode::DontWait),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_no_wait_read_on_empty_queue() {
        let (a, _b) = stream_pair();

        let mut buf = [0u8; 16];

        assert_eq!(a.read(&mut buf, Timeout::NoWait).unwrap(), 0);
    }

    #[test]
    fn test_deadline_read_times_out() {
        _ = pretty_env_logger::try_init();

        let (a, _b) = stream_pair();

        let mut buf = [0u8; 16];

        let start = Instant::now();

        assert_eq!(a.read(&mut buf, Timeout::Millis(200)).unwrap(), 0);

        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(190));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn test_deadline_read_accumulates() {
        let (a, b) = stream_pair();

        let writer = thread::spawn(move || {
            b.write(b"hello ", WriteMode::WaitQueued).unwrap();
            thread::sleep(Duration::from_millis(50));
            b.write(b"world", WriteMode::WaitQueued).unwrap();
            b
        });

        let mut buf = [0u8; 11];

        assert_eq!(a.read(&mut buf, Timeout::Millis(2000)).unwrap(), 11);
        assert_eq!(&buf, b"hello world");

        writer.join().unwrap();
    }

    #[test]
    fn test_read_never_exceeds_buffer() {
        let (a, b) = stream_pair();

        b.write(b"0123456789", WriteMode::WaitQueued).unwrap();

        let mut buf = [0u8; 4];

        assert_eq!(a.read(&mut buf, Timeout::Millis(100)).unwrap(), 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(a.pending().unwrap(), 6);
    }

    #[test]
    fn test_deadline_read_stops_on_peer_close() {
        let (a, mut b) = stream_pair();

        b.write(b"abc", WriteMode::WaitQueued).unwrap();
        b.close();

        let mut buf = [0u8; 16];

        let start = Instant::now();

        assert_eq!(a.read(&mut buf, Timeout::Millis(5000)).unwrap(), 3);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_forever_read_waits_for_all() {
        let (a, b) = stream_pair();

        let writer = thread::spawn(move || {
            for chunk in [&b"ab"[..], b"cd", b"ef"] {
                b.write(chunk, WriteMode::WaitQueued).unwrap();
                thread::sleep(Duration::from_millis(20));
            }
            b
        });

        let mut buf = [0u8; 6];

        assert_eq!(a.read(&mut buf, Timeout::Forever).unwrap(), 6);
        assert_eq!(&buf, b"abcdef");

        writer.join().unwrap();
    }

    #[test]
    fn test_write_to_closed_peer_does_not_raise_sigpipe() {
        let (a, b) = stream_pair();

        drop(b);

        let err = a.write(b"x", WriteMode::WaitQueued).unwrap_err();

        assert_eq!(err.raw_os_error(), Some(libc::EPIPE));
    }

    #[test]
    fn test_pending_skips_empty_datagram() {
        let (a, b) = Handle::pair(libc::AF_UNIX, libc::SOCK_DGRAM).unwrap();

        let empty: [u8; 0] = [];

        let sent = unsafe { libc::send(b.as_raw_fd(), empty.as_ptr() as *const c_void, 0, 0) };

        assert_eq!(sent, 0);

        b.write(b"payload", WriteMode::WaitQueued).unwrap();

        assert_eq!(a.pending().unwrap(), 0);
        assert_eq!(a.pending().unwrap(), 7);
    }
}
