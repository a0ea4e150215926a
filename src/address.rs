//! Fixed-size, domain-tagged socket addresses.
//!
//! [`Address`] wraps one of the BSD address structures. The structure type is
//! the type parameter, so the byte length handed to the kernel is always
//! `size_of::<T>()` and can never disagree with the domain tag.

use std::{fmt, mem::size_of};

use libc::{sa_family_t, sockaddr, socklen_t};

mod private {
    pub trait Sealed {}

    impl Sealed for libc::sockaddr_in {}
    impl Sealed for libc::sockaddr_un {}
    impl Sealed for libc::sockaddr_ll {}
}

/// Native address structure of a transport domain.
pub trait RawAddress: Copy + private::Sealed {
    /// Address family stored in the structure's family field.
    const FAMILY: libc::c_int;

    /// Human readable form, used by `Debug`.
    fn fmt_raw(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

/// A socket address of domain `T`.
#[derive(Clone, Copy)]
pub struct Address<T: RawAddress> {
    raw: T,
}

impl<T: RawAddress> Address<T> {
    /// All-zero address with only the family field set.
    pub fn new_zeroed() -> Self {
        // Safety: every supported structure is plain old data.
        let mut raw: T = unsafe { std::mem::zeroed() };

        unsafe {
            (*(&mut raw as *mut T as *mut sockaddr)).sa_family = T::FAMILY as sa_family_t;
        }

        Self { raw }
    }

    pub(crate) fn from_raw(raw: T) -> Self {
        Self { raw }
    }

    /// Size of the native structure in bytes.
    pub fn size(&self) -> socklen_t {
        size_of::<T>() as socklen_t
    }

    /// Address family carried by the structure.
    pub fn family(&self) -> libc::c_int {
        unsafe { (*self.as_ptr()).sa_family as libc::c_int }
    }

    pub fn as_ptr(&self) -> *const sockaddr {
        &self.raw as *const T as *const sockaddr
    }

    pub fn as_mut_ptr(&mut self) -> *mut sockaddr {
        &mut self.raw as *mut T as *mut sockaddr
    }

    /// Borrow the native structure.
    pub fn as_raw(&self) -> &T {
        &self.raw
    }

    pub fn as_raw_mut(&mut self) -> &mut T {
        &mut self.raw
    }

    /// Raw bytes exactly as the kernel sees them.
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.as_ptr() as *const u8, size_of::<T>()) }
    }
}

impl<T: RawAddress> Default for Address<T> {
    fn default() -> Self {
        Self::new_zeroed()
    }
}

impl<T: RawAddress> PartialEq for Address<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<T: RawAddress> Eq for Address<T> {}

impl<T: RawAddress> fmt::Debug for Address<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.raw.fmt_raw(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_matches_domain() {
        assert_eq!(
            Address::<libc::sockaddr_in>::default().size() as usize,
            size_of::<libc::sockaddr_in>()
        );
        assert_eq!(
            Address::<libc::sockaddr_un>::default().size() as usize,
            size_of::<libc::sockaddr_un>()
        );
        assert_eq!(
            Address::<libc::sockaddr_ll>::default().size() as usize,
            size_of::<libc::sockaddr_ll>()
        );
    }

    #[test]
    fn test_zeroed_carries_family() {
        let addr = Address::<libc::sockaddr_un>::default();

        assert_eq!(addr.family(), libc::AF_UNIX);
        assert!(addr.as_bytes()[size_of::<sa_family_t>()..]
            .iter()
            .all(|b| *b == 0));
    }
}
