//! Capability trait shared by every socket type.

use crate::{BufferKind, Handle, IoMode, Result, Timeout, WriteMode};

/// Generic socket operations.
///
/// Domain types own exactly one [`Handle`] and expose it through
/// [`handle`](Socket::handle); everything else is provided on top of it.
pub trait Socket {
    /// The owned descriptor.
    fn handle(&self) -> &Handle;

    fn handle_mut(&mut self) -> &mut Handle;

    /// See [`Handle::read`].
    fn read(&self, buf: &mut [u8], timeout: Timeout) -> Result<usize> {
        self.handle().read(buf, timeout)
    }

    /// See [`Handle::write`].
    fn write(&self, buf: &[u8], mode: WriteMode) -> Result<usize> {
        self.handle().write(buf, mode)
    }

    /// See [`Handle::pending`].
    fn pending(&self) -> Result<usize> {
        self.handle().pending()
    }

    /// See [`Handle::wait_data`].
    fn wait_data(&self, timeout: Timeout) -> Result<u32> {
        self.handle().wait_data(timeout)
    }

    fn buffer_length(&self, kind: BufferKind) -> Result<usize> {
        self.handle().buffer_length(kind)
    }

    fn set_buffer_length(&self, kind: BufferKind, len: usize) -> Result<()> {
        self.handle().set_buffer_length(kind, len)
    }

    fn set_io_mode(&self, mode: IoMode) -> Result<()> {
        self.handle().set_io_mode(mode)
    }

    /// Release the descriptor without shutdown. See [`Handle::close`].
    fn close(&mut self) {
        self.handle_mut().close()
    }

    fn is_valid(&self) -> bool {
        self.handle().is_valid()
    }
}

impl Socket for Handle {
    fn handle(&self) -> &Handle {
        self
    }

    fn handle_mut(&mut self) -> &mut Handle {
        self
    }
}

/// Implement [`Socket`] for types holding their [`Handle`] at `$field`.
macro_rules! impl_socket {
    ($($ty:ty => $($field:ident).+),* $(,)?) => {
        $(
            impl $crate::Socket for $ty {
                fn handle(&self) -> &$crate::Handle {
                    &self.$($field).+
                }

                fn handle_mut(&mut self) -> &mut $crate::Handle {
                    &mut self.$($field).+
                }
            }

            impl std::os::fd::AsRawFd for $ty {
                fn as_raw_fd(&self) -> std::os::fd::RawFd {
                    std::os::fd::AsRawFd::as_raw_fd(&self.$($field).+)
                }
            }
        )*
    };
}

pub(crate) use impl_socket;
