//! Domain specialisations built around one owned [`Handle`].

pub mod inet;
pub mod packet;
pub mod unix;

use std::ptr::null_mut;

use crate::{
    address::{Address, RawAddress},
    Error, Handle, Result, Timeout,
};

/// Backlog used by `listen` when the caller does not choose one.
pub const DEFAULT_BACKLOG: i32 = 32;

/// Listening progress of a stream server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Unbound,
    Bound,
    Listening,
}

impl Handle {
    pub(crate) fn bind<T: RawAddress>(&self, addr: &Address<T>) -> Result<()> {
        let fd = self.check()?;

        if unsafe { libc::bind(fd, addr.as_ptr(), addr.size()) } < 0 {
            return Err(Error::last_os_error("bind"));
        }

        log::trace!(target: "socklib", "fd({}) bind {:?}", fd, addr);

        Ok(())
    }

    pub(crate) fn connect<T: RawAddress>(&self, addr: &Address<T>) -> Result<()> {
        let fd = self.check()?;

        if unsafe { libc::connect(fd, addr.as_ptr(), addr.size()) } < 0 {
            return Err(Error::last_os_error("connect"));
        }

        log::trace!(target: "socklib", "fd({}) connect {:?}", fd, addr);

        Ok(())
    }

    pub(crate) fn listen(&self, backlog: i32) -> Result<()> {
        let fd = self.check()?;

        if unsafe { libc::listen(fd, backlog) } < 0 {
            return Err(Error::last_os_error("listen"));
        }

        Ok(())
    }

    /// Wait up to `timeout` for a pending connection and accept it.
    pub(crate) fn accept<T: RawAddress>(
        &self,
        timeout: Timeout,
        origin: Option<&mut Address<T>>,
    ) -> Result<Option<Handle>> {
        let fd = self.check()?;

        if self.wait_data(timeout)? == 0 {
            return Ok(None);
        }

        let conn = match origin {
            Some(origin) => {
                let mut len = origin.size();

                unsafe { libc::accept(fd, origin.as_mut_ptr(), &mut len) }
            }
            None => unsafe { libc::accept(fd, null_mut(), null_mut()) },
        };

        if conn < 0 {
            return Err(Error::last_os_error("accept"));
        }

        log::trace!(target: "socklib", "fd({}) accept connection fd({})", fd, conn);

        Ok(Some(Handle::from_raw_fd(conn)?))
    }

    pub(crate) fn local_address<T: RawAddress>(&self) -> Result<Address<T>> {
        let fd = self.check()?;

        let mut addr = Address::<T>::default();
        let mut len = addr.size();

        if unsafe { libc::getsockname(fd, addr.as_mut_ptr(), &mut len) } < 0 {
            return Err(Error::last_os_error("getsockname"));
        }

        Ok(addr)
    }

    pub(crate) fn peer_address<T: RawAddress>(&self) -> Result<Address<T>> {
        let fd = self.check()?;

        let mut addr = Address::<T>::default();
        let mut len = addr.size();

        if unsafe { libc::getpeername(fd, addr.as_mut_ptr(), &mut len) } < 0 {
            return Err(Error::last_os_error("getpeername"));
        }

        Ok(addr)
    }
}
