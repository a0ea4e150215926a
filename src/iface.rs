//! Network interface queries: names, indices, hardware and IPv4 addresses.

use std::{
    ffi::{CStr, CString},
    net::Ipv4Addr,
    os::fd::RawFd,
};

use crate::{Error, Handle, Result};

/// Build an `ifreq` carrying `name`.
pub(crate) fn ifreq_for(name: &str) -> Result<libc::ifreq> {
    if name.is_empty() {
        return Err(Error::InvalidArgument("interface name is empty"));
    }

    if name.len() >= libc::IFNAMSIZ {
        return Err(Error::InvalidArgument("interface name is too long"));
    }

    if name.as_bytes().contains(&0) {
        return Err(Error::InvalidArgument("interface name contains NUL"));
    }

    let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };

    for (d, s) in ifr.ifr_name.iter_mut().zip(name.as_bytes()) {
        *d = *s as libc::c_char;
    }

    Ok(ifr)
}

/// Issue an interface `ioctl` on `fd`.
pub(crate) fn ioctl(
    fd: RawFd,
    request: libc::c_ulong,
    ifr: &mut libc::ifreq,
    op: &'static str,
) -> Result<()> {
    if unsafe { libc::ioctl(fd, request as _, ifr as *mut libc::ifreq) } < 0 {
        return Err(Error::last_os_error(op));
    }

    Ok(())
}

pub(crate) fn hardware_address(fd: RawFd, iface: &str) -> Result<[u8; 6]> {
    let mut ifr = ifreq_for(iface)?;

    ioctl(fd, libc::SIOCGIFHWADDR, &mut ifr, "ioctl(SIOCGIFHWADDR)")?;

    let data = unsafe { ifr.ifr_ifru.ifru_hwaddr.sa_data };

    let mut mac = [0u8; 6];

    for (d, s) in mac.iter_mut().zip(data.iter()) {
        *d = *s as u8;
    }

    Ok(mac)
}

pub(crate) fn ipv4_address_of(fd: RawFd, iface: &str) -> Result<Option<Ipv4Addr>> {
    let mut ifr = ifreq_for(iface)?;

    match ioctl(fd, libc::SIOCGIFADDR, &mut ifr, "ioctl(SIOCGIFADDR)") {
        Ok(()) => {}
        Err(err) if err.raw_os_error() == Some(libc::EADDRNOTAVAIL) => return Ok(None),
        Err(err) => return Err(err),
    }

    // Safety: SIOCGIFADDR fills ifru_addr with a sockaddr_in.
    let addr = unsafe {
        *(&ifr.ifr_ifru.ifru_addr as *const libc::sockaddr as *const libc::sockaddr_in)
    };

    Ok(Some(Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr))))
}

pub(crate) fn mtu_of(fd: RawFd, iface: &str) -> Result<usize> {
    let mut ifr = ifreq_for(iface)?;

    ioctl(fd, libc::SIOCGIFMTU, &mut ifr, "ioctl(SIOCGIFMTU)")?;

    Ok(unsafe { ifr.ifr_ifru.ifru_mtu } as usize)
}

fn query_socket() -> Result<Handle> {
    Handle::open(libc::AF_INET, libc::SOCK_DGRAM, 0)
}

/// Kernel index of interface `name`.
pub fn interface_index(name: &str) -> Result<u32> {
    ifreq_for(name)?;

    let cname =
        CString::new(name).map_err(|_| Error::InvalidArgument("interface name contains NUL"))?;

    let index = unsafe { libc::if_nametoindex(cname.as_ptr()) };

    if index == 0 {
        return Err(Error::last_os_error("if_nametoindex"));
    }

    Ok(index)
}

/// Names of all network interfaces, in kernel index order.
pub fn interface_names() -> Result<Vec<String>> {
    let list = unsafe { libc::if_nameindex() };

    if list.is_null() {
        return Err(Error::last_os_error("if_nameindex"));
    }

    let mut names = vec![];

    let mut entry = list;

    unsafe {
        while (*entry).if_index != 0 && !(*entry).if_name.is_null() {
            names.push(CStr::from_ptr((*entry).if_name).to_string_lossy().into_owned());

            entry = entry.add(1);
        }

        libc::if_freenameindex(list);
    }

    Ok(names)
}

/// Hardware (MAC) address of `iface`.
pub fn mac_address(iface: &str) -> Result<[u8; 6]> {
    let socket = query_socket()?;

    hardware_address(socket.check()?, iface)
}

/// IPv4 address of `iface`, `None` if it has none configured.
pub fn ipv4_address(iface: &str) -> Result<Option<Ipv4Addr>> {
    let socket = query_socket()?;

    ipv4_address_of(socket.check()?, iface)
}

/// MTU of `iface`.
pub fn mtu(iface: &str) -> Result<usize> {
    let socket = query_socket()?;

    mtu_of(socket.check()?, iface)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_is_listed() {
        let names = interface_names().unwrap();

        assert!(names.iter().any(|name| name == "lo"), "{:?}", names);
        assert!(interface_index("lo").unwrap() > 0);
    }

    #[test]
    fn test_loopback_addresses() {
        assert_eq!(ipv4_address("lo").unwrap(), Some(Ipv4Addr::LOCALHOST));
        assert_eq!(mac_address("lo").unwrap(), [0u8; 6]);
        assert!(mtu("lo").unwrap() > 0);
    }

    #[test]
    fn test_name_validation() {
        assert!(matches!(
            interface_index(""),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            mac_address(&"x".repeat(libc::IFNAMSIZ)),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            interface_index("no-such-if0"),
            Err(Error::System { .. })
        ));
    }
}
