//! UNIX domain sockets over filesystem paths or the Linux abstract namespace.

mod datagram;
mod stream;

pub use datagram::*;
pub use stream::*;

use std::{
    ffi::OsStr,
    fmt,
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};

use libc::sockaddr_un;

use crate::{address::RawAddress, Handle};

/// UNIX domain socket address.
pub type Address = crate::address::Address<sockaddr_un>;

impl RawAddress for sockaddr_un {
    const FAMILY: libc::c_int = libc::AF_UNIX;

    fn fmt_raw(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = path_bytes(self);

        if path.is_empty() {
            write!(f, "unix:(unnamed)")
        } else if path[0] == 0 {
            write!(f, "unix:@{}", String::from_utf8_lossy(trim_nul(&path[1..])))
        } else {
            write!(f, "unix:{}", String::from_utf8_lossy(trim_nul(path)))
        }
    }
}

fn path_bytes(raw: &sockaddr_un) -> &[u8] {
    // Safety: c_char and u8 share size and alignment.
    let path = unsafe {
        std::slice::from_raw_parts(raw.sun_path.as_ptr() as *const u8, raw.sun_path.len())
    };

    if path.iter().all(|b| *b == 0) {
        &[]
    } else {
        path
    }
}

fn trim_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|b| *b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

impl crate::address::Address<sockaddr_un> {
    /// A name beginning with `/` selects the filesystem namespace, anything
    /// else the abstract namespace.
    pub fn new(name: &str) -> Self {
        if name.starts_with('/') {
            Self::from_path(name)
        } else {
            Self::abstract_name(name)
        }
    }

    /// Filesystem address. Paths longer than `sun_path` are truncated.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let mut address = Self::new_zeroed();

        copy_into(
            &mut address.as_raw_mut().sun_path,
            0,
            path.as_ref().as_os_str().as_bytes(),
        );

        address
    }

    /// Abstract namespace address: a leading NUL byte followed by `name`,
    /// truncated to fit.
    pub fn abstract_name(name: &str) -> Self {
        let mut address = Self::new_zeroed();

        copy_into(&mut address.as_raw_mut().sun_path, 1, name.as_bytes());

        address
    }

    /// Filesystem path, `None` for abstract or unnamed addresses.
    pub fn path(&self) -> Option<PathBuf> {
        let path = path_bytes(self.as_raw());

        match path.first() {
            Some(b) if *b != 0 => Some(PathBuf::from(OsStr::from_bytes(trim_nul(path)))),
            _ => None,
        }
    }

    pub fn is_abstract(&self) -> bool {
        matches!(path_bytes(self.as_raw()).first(), Some(0))
    }
}

fn copy_into(dest: &mut [libc::c_char], offset: usize, src: &[u8]) {
    let len = src.len().min(dest.len() - offset);

    for (d, s) in dest[offset..offset + len].iter_mut().zip(src) {
        *d = *s as libc::c_char;
    }
}

/// Remove the filesystem entry `handle` is bound to, after closing it.
///
/// Abstract and unnamed sockets leave nothing behind.
fn terminate_and_unlink(handle: &mut Handle) {
    if !handle.is_valid() {
        return;
    }

    let path = handle
        .local_address::<sockaddr_un>()
        .ok()
        .and_then(|addr| addr.path());

    handle.terminate();

    if let Some(path) = path {
        match std::fs::remove_file(&path) {
            Ok(()) => log::debug!(target: "socklib", "unlink socket file {:?}", path),
            Err(err) => log::debug!(target: "socklib", "unlink socket file {:?}: {}", path, err),
        }
    }
}
