//! Owned socket descriptor with inode-based staleness detection.

use std::{
    fmt,
    mem::size_of,
    os::fd::{AsRawFd, RawFd},
};

use crate::{BufferKind, Error, IoMode, Result};

const INVALID_FD: RawFd = -1;
const INVALID_INODE: u64 = 0;

/// Exclusive owner of one socket descriptor.
///
/// Besides the descriptor number the handle records the inode of the socket
/// at open time. If the descriptor is closed behind our back and the number
/// is handed out again, the inode no longer matches and the handle reports
/// itself invalid instead of operating on an unrelated file.
///
/// Dropping a valid handle shuts the socket down in both directions and
/// closes it. Use [`close`](Handle::close) to release the descriptor without
/// the shutdown, e.g. in a forked child that must not disturb the parent's
/// connections.
pub struct Handle {
    fd: RawFd,
    inode: u64,
}

impl Handle {
    /// Open a new socket of `family` / `ty` / `protocol`.
    pub(crate) fn open(family: libc::c_int, ty: libc::c_int, protocol: libc::c_int) -> Result<Self> {
        let fd = unsafe { libc::socket(family, ty, protocol) };

        if fd < 0 {
            return Err(Error::last_os_error("socket"));
        }

        let handle = Self::from_raw_fd(fd)?;

        log::trace!(target: "socklib", "fd({}) open family({}) type({})", fd, family, ty);

        Ok(handle)
    }

    /// Adopt an already open descriptor, e.g. one returned by `accept(2)`.
    ///
    /// The descriptor is closed if its inode cannot be read.
    pub(crate) fn from_raw_fd(fd: RawFd) -> Result<Self> {
        let inode = inode_of(fd);

        if inode == INVALID_INODE {
            let err = Error::last_os_error("fstat");

            unsafe { libc::close(fd) };

            return Err(err);
        }

        Ok(Self { fd, inode })
    }

    /// Open a connected pair through `socketpair(2)`.
    pub(crate) fn pair(family: libc::c_int, ty: libc::c_int) -> Result<(Self, Self)> {
        let mut fds: [RawFd; 2] = [INVALID_FD; 2];

        if unsafe { libc::socketpair(family, ty, 0, fds.as_mut_ptr()) } < 0 {
            return Err(Error::last_os_error("socketpair"));
        }

        log::trace!(target: "socklib", "fd({}) fd({}) socketpair", fds[0], fds[1]);

        let first = match Self::from_raw_fd(fds[0]) {
            Ok(handle) => handle,
            Err(err) => {
                unsafe { libc::close(fds[1]) };

                return Err(err);
            }
        };

        Ok((first, Self::from_raw_fd(fds[1])?))
    }

    /// Returns true while the descriptor is open and still refers to the
    /// socket that was opened.
    pub fn is_valid(&self) -> bool {
        self.fd != INVALID_FD && self.inode != INVALID_INODE && inode_of(self.fd) == self.inode
    }

    /// Descriptor of a valid handle, or [`Error::InvalidState`].
    pub(crate) fn check(&self) -> Result<RawFd> {
        if self.is_valid() {
            Ok(self.fd)
        } else {
            Err(Error::InvalidState)
        }
    }

    /// Inode recorded when the descriptor was acquired.
    pub fn inode(&self) -> u64 {
        self.inode
    }

    /// Release the descriptor without shutting the connection down.
    ///
    /// A stale handle, whose descriptor number now belongs to another file,
    /// is only invalidated.
    pub fn close(&mut self) {
        if self.is_valid() {
            log::trace!(target: "socklib", "fd({}) close", self.fd);

            unsafe { libc::close(self.fd) };
        }

        self.invalidate();
    }

    /// Shut down both directions and close.
    pub(crate) fn terminate(&mut self) {
        if self.is_valid() {
            log::trace!(target: "socklib", "fd({}) shutdown and close", self.fd);

            unsafe {
                libc::shutdown(self.fd, libc::SHUT_RDWR);
                libc::close(self.fd);
            }
        }

        self.invalidate();
    }

    /// Move the descriptor out, leaving an invalid handle behind.
    pub fn take(&mut self) -> Handle {
        std::mem::take(self)
    }

    fn invalidate(&mut self) {
        self.fd = INVALID_FD;
        self.inode = INVALID_INODE;
    }

    /// Current size of the send or receive queue.
    pub fn buffer_length(&self, kind: BufferKind) -> Result<usize> {
        let value = self.get_option(libc::SOL_SOCKET, kind.sockopt(), "getsockopt(buffer)")?;

        Ok(value as usize)
    }

    /// Request a new size for the send or receive queue.
    pub fn set_buffer_length(&self, kind: BufferKind, len: usize) -> Result<()> {
        let len = libc::c_int::try_from(len)
            .map_err(|_| Error::InvalidArgument("buffer length does not fit a c_int"))?;

        self.set_option(libc::SOL_SOCKET, kind.sockopt(), len, "setsockopt(buffer)")
    }

    /// Toggle `O_NONBLOCK` on the descriptor.
    pub fn set_io_mode(&self, mode: IoMode) -> Result<()> {
        let fd = self.check()?;

        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFL);

            if flags < 0 {
                return Err(Error::last_os_error("fcntl(F_GETFL)"));
            }

            let flags = match mode {
                IoMode::Blocking => flags & !libc::O_NONBLOCK,
                IoMode::NonBlocking => flags | libc::O_NONBLOCK,
            };

            if libc::fcntl(fd, libc::F_SETFL, flags) < 0 {
                return Err(Error::last_os_error("fcntl(F_SETFL)"));
            }
        }

        Ok(())
    }

    pub(crate) fn set_option(
        &self,
        level: libc::c_int,
        name: libc::c_int,
        value: libc::c_int,
        op: &'static str,
    ) -> Result<()> {
        self.set_option_raw(level, name, &value, op)
    }

    pub(crate) fn set_option_raw<T>(
        &self,
        level: libc::c_int,
        name: libc::c_int,
        value: &T,
        op: &'static str,
    ) -> Result<()> {
        let fd = self.check()?;

        let ret = unsafe {
            libc::setsockopt(
                fd,
                level,
                name,
                value as *const T as *const libc::c_void,
                size_of::<T>() as libc::socklen_t,
            )
        };

        if ret < 0 {
            return Err(Error::last_os_error(op));
        }

        Ok(())
    }

    pub(crate) fn set_option_bytes(
        &self,
        level: libc::c_int,
        name: libc::c_int,
        value: &[u8],
        op: &'static str,
    ) -> Result<()> {
        let fd = self.check()?;

        let ret = unsafe {
            libc::setsockopt(
                fd,
                level,
                name,
                value.as_ptr() as *const libc::c_void,
                value.len() as libc::socklen_t,
            )
        };

        if ret < 0 {
            return Err(Error::last_os_error(op));
        }

        Ok(())
    }

    pub(crate) fn get_option(
        &self,
        level: libc::c_int,
        name: libc::c_int,
        op: &'static str,
    ) -> Result<libc::c_int> {
        let fd = self.check()?;

        let mut value: libc::c_int = 0;
        let mut len = size_of::<libc::c_int>() as libc::socklen_t;

        let ret = unsafe {
            libc::getsockopt(
                fd,
                level,
                name,
                &mut value as *mut libc::c_int as *mut libc::c_void,
                &mut len,
            )
        };

        if ret < 0 {
            return Err(Error::last_os_error(op));
        }

        Ok(value)
    }
}

impl Default for Handle {
    /// An invalid handle that owns nothing.
    fn default() -> Self {
        Self {
            fd: INVALID_FD,
            inode: INVALID_INODE,
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if self.fd != INVALID_FD {
            if self.is_valid() {
                log::debug!(target: "socklib", "drop socket fd({})", self.fd);
            } else {
                log::debug!(target: "socklib", "drop stale socket fd({}), descriptor left open", self.fd);
            }
        }

        self.terminate();
    }
}

impl AsRawFd for Handle {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("fd", &self.fd)
            .field("inode", &self.inode)
            .finish()
    }
}

fn inode_of(fd: RawFd) -> u64 {
    if fd == INVALID_FD {
        return INVALID_INODE;
    }

    let mut st: libc::stat = unsafe { std::mem::zeroed() };

    if unsafe { libc::fstat(fd, &mut st) } < 0 {
        return INVALID_INODE;
    }

    st.st_ino as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_after_open() {
        let handle = Handle::open(libc::AF_INET, libc::SOCK_DGRAM, 0).unwrap();

        assert!(handle.is_valid());
        assert_ne!(handle.inode(), INVALID_INODE);
    }

    #[test]
    fn test_invalid_after_close() {
        let mut handle = Handle::open(libc::AF_UNIX, libc::SOCK_STREAM, 0).unwrap();

        handle.close();

        assert!(!handle.is_valid());
        assert!(matches!(handle.check(), Err(Error::InvalidState)));
    }

    #[test]
    fn test_take_invalidates_source() {
        let mut handle = Handle::open(libc::AF_UNIX, libc::SOCK_DGRAM, 0).unwrap();
        let inode = handle.inode();

        let moved = handle.take();

        assert!(!handle.is_valid());
        assert!(moved.is_valid());
        assert_eq!(moved.inode(), inode);
    }

    #[test]
    fn test_detects_reused_descriptor() {
        let handle = Handle::open(libc::AF_UNIX, libc::SOCK_STREAM, 0).unwrap();
        let fd = handle.as_raw_fd();

        // Close the descriptor behind the handle's back and put another
        // socket on the same number.
        let other = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_DGRAM, 0) };

        assert!(other >= 0);

        let other_inode = inode_of(other);

        unsafe {
            libc::dup2(other, fd);
            libc::close(other);
        }

        assert!(!handle.is_valid());
        assert!(matches!(handle.check(), Err(Error::InvalidState)));

        drop(handle);

        // The unrelated socket now living on `fd` survives the stale drop.
        assert!(unsafe { libc::fcntl(fd, libc::F_GETFD) } >= 0);
        assert_eq!(inode_of(fd), other_inode);

        unsafe { libc::close(fd) };
    }

    #[test]
    fn test_close_of_stale_handle_leaves_descriptor_open() {
        let mut handle = Handle::open(libc::AF_UNIX, libc::SOCK_DGRAM, 0).unwrap();
        let fd = handle.as_raw_fd();

        let other = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM, 0) };

        assert!(other >= 0);

        unsafe {
            libc::dup2(other, fd);
            libc::close(other);
        }

        handle.close();

        assert!(!handle.is_valid());
        assert!(unsafe { libc::fcntl(fd, libc::F_GETFD) } >= 0);

        unsafe { libc::close(fd) };
    }

    #[test]
    fn test_buffer_length() {
        let handle = Handle::open(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();

        handle.set_buffer_length(BufferKind::Receive, 65536).unwrap();

        // Linux doubles the requested value for bookkeeping.
        assert!(handle.buffer_length(BufferKind::Receive).unwrap() >= 65536);
        assert!(handle.buffer_length(BufferKind::Send).unwrap() > 0);
    }

    #[test]
    fn test_invalid_handle_options() {
        let handle = Handle::default();

        assert!(matches!(
            handle.buffer_length(BufferKind::Send),
            Err(Error::InvalidState)
        ));
        assert!(matches!(
            handle.set_io_mode(IoMode::NonBlocking),
            Err(Error::InvalidState)
        ));
    }
}
