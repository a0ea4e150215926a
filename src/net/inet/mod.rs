//! Internet (IPv4) domain: TCP streams, UDP datagrams, multicast and broadcast.

mod datagram;
mod stream;

pub use datagram::*;
pub use stream::*;

use std::{
    fmt,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs},
    time::Duration,
};

use libc::sockaddr_in;
use os_socketaddr::OsSocketAddr;

use crate::{address::RawAddress, Error, Result, Socket};

/// IPv4 socket address.
pub type Address = crate::address::Address<sockaddr_in>;

impl RawAddress for sockaddr_in {
    const FAMILY: libc::c_int = libc::AF_INET;

    fn fmt_raw(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            Ipv4Addr::from(u32::from_be(self.sin_addr.s_addr)),
            u16::from_be(self.sin_port)
        )
    }
}

impl crate::address::Address<sockaddr_in> {
    /// Address from a host-order integer address and port.
    ///
    /// `addr` may be one of the special values `INADDR_ANY` or
    /// `INADDR_BROADCAST`.
    pub fn new(addr: u32, port: u16) -> Self {
        let mut address = Self::new_zeroed();

        let raw = address.as_raw_mut();

        raw.sin_port = port.to_be();
        raw.sin_addr.s_addr = addr.to_be();

        address
    }

    pub fn from_ip(ip: Ipv4Addr, port: u16) -> Self {
        Self::new(u32::from(ip), port)
    }

    /// Wildcard address on `port`.
    pub fn any(port: u16) -> Self {
        Self::new(libc::INADDR_ANY, port)
    }

    /// Limited broadcast address on `port`.
    pub fn broadcast(port: u16) -> Self {
        Self::new(libc::INADDR_BROADCAST, port)
    }

    /// Resolve `host` and use its first IPv4 address.
    pub fn resolve(host: &str, port: u16) -> Result<Self> {
        let addrs = (host, port).to_socket_addrs().map_err(|err| Error::Resolve {
            host: host.to_owned(),
            message: err.to_string(),
        })?;

        for addr in addrs {
            if let SocketAddr::V4(v4) = addr {
                log::debug!(target: "socklib", "resolve({}) -> {}", host, v4);

                return Ok(v4.into());
            }
        }

        Err(Error::Resolve {
            host: host.to_owned(),
            message: "no IPv4 address found".to_owned(),
        })
    }

    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from_be(self.as_raw().sin_addr.s_addr))
    }

    pub fn port(&self) -> u16 {
        u16::from_be(self.as_raw().sin_port)
    }
}

impl From<SocketAddrV4> for Address {
    fn from(value: SocketAddrV4) -> Self {
        let os: OsSocketAddr = SocketAddr::V4(value).into();

        // Safety: OsSocketAddr holds a sockaddr_in for V4 addresses.
        let raw = unsafe { *(os.as_ptr() as *const sockaddr_in) };

        Self::from_raw(raw)
    }
}

impl TryFrom<SocketAddr> for Address {
    type Error = Error;

    fn try_from(value: SocketAddr) -> Result<Self> {
        match value {
            SocketAddr::V4(v4) => Ok(v4.into()),
            SocketAddr::V6(_) => Err(Error::InvalidArgument("IPv6 addresses are not supported")),
        }
    }
}

impl From<Address> for SocketAddrV4 {
    fn from(value: Address) -> Self {
        let os = unsafe {
            OsSocketAddr::copy_from_raw(value.as_ptr() as *mut libc::sockaddr, value.size())
        };

        match os.into_addr() {
            Some(SocketAddr::V4(v4)) => v4,
            _ => SocketAddrV4::new(value.ip(), value.port()),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip(), self.port())
    }
}

/// Whether a server may bind a port still in `TIME_WAIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reuse {
    #[default]
    DontReuse,
    Reuse,
}

/// TCP keep-alive probing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    /// Idle time before the first probe.
    pub idle: Duration,
    /// Interval between probes.
    pub interval: Duration,
    /// Unanswered probes before the connection is dropped.
    pub count: u32,
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self {
            idle: Duration::from_secs(180),
            interval: Duration::from_secs(15),
            count: 9,
        }
    }
}

/// Operations common to every internet socket.
pub trait InetSocket: Socket {
    /// Local address the socket is bound to.
    fn local_address(&self) -> Result<Address> {
        self.handle().local_address()
    }

    /// Address of the connected peer.
    fn peer_address(&self) -> Result<Address> {
        self.handle().peer_address()
    }

    /// Path MTU known to a connected socket.
    fn mtu(&self) -> Result<usize> {
        let mtu = self
            .handle()
            .get_option(libc::IPPROTO_IP, libc::IP_MTU, "getsockopt(IP_MTU)")?;

        Ok(mtu as usize)
    }

    /// Restrict the socket to one interface; an empty name removes the binding.
    fn bind_to_device(&self, iface: &str) -> Result<()> {
        self.handle().set_option_bytes(
            libc::SOL_SOCKET,
            libc::SO_BINDTODEVICE,
            iface.as_bytes(),
            "setsockopt(SO_BINDTODEVICE)",
        )
    }
}

/// TCP-level options for connected or connecting stream sockets.
pub trait StreamOptions: InetSocket {
    /// Enable keep-alive probing with `params`, or disable it with `None`.
    fn set_keep_alive(&self, params: Option<KeepAlive>) -> Result<()> {
        let handle = self.handle();

        match params {
            None => handle.set_option(
                libc::SOL_SOCKET,
                libc::SO_KEEPALIVE,
                0,
                "setsockopt(SO_KEEPALIVE)",
            ),
            Some(params) => {
                handle.set_option(
                    libc::SOL_SOCKET,
                    libc::SO_KEEPALIVE,
                    1,
                    "setsockopt(SO_KEEPALIVE)",
                )?;
                handle.set_option(
                    libc::IPPROTO_TCP,
                    libc::TCP_KEEPIDLE,
                    seconds(params.idle)?,
                    "setsockopt(TCP_KEEPIDLE)",
                )?;
                handle.set_option(
                    libc::IPPROTO_TCP,
                    libc::TCP_KEEPINTVL,
                    seconds(params.interval)?,
                    "setsockopt(TCP_KEEPINTVL)",
                )?;
                handle.set_option(
                    libc::IPPROTO_TCP,
                    libc::TCP_KEEPCNT,
                    libc::c_int::try_from(params.count)
                        .map_err(|_| Error::InvalidArgument("keep-alive count out of range"))?,
                    "setsockopt(TCP_KEEPCNT)",
                )
            }
        }
    }

    /// Linger on drop for at most `timeout`, or close in the background with `None`.
    fn set_linger(&self, timeout: Option<Duration>) -> Result<()> {
        let linger = match timeout {
            Some(timeout) => libc::linger {
                l_onoff: 1,
                l_linger: seconds(timeout)?,
            },
            None => libc::linger {
                l_onoff: 0,
                l_linger: 0,
            },
        };

        self.handle().set_option_raw(
            libc::SOL_SOCKET,
            libc::SO_LINGER,
            &linger,
            "setsockopt(SO_LINGER)",
        )
    }

    /// Disable (true) or enable (false) Nagle's algorithm.
    fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.handle().set_option(
            libc::IPPROTO_TCP,
            libc::TCP_NODELAY,
            nodelay as libc::c_int,
            "setsockopt(TCP_NODELAY)",
        )
    }
}

fn seconds(duration: Duration) -> Result<libc::c_int> {
    libc::c_int::try_from(duration.as_secs())
        .map_err(|_| Error::InvalidArgument("duration does not fit in seconds"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_round_trip() {
        let addr = Address::new(0x7f00_0001, 9999);

        assert_eq!(addr.ip(), Ipv4Addr::LOCALHOST);
        assert_eq!(addr.port(), 9999);

        // network byte order in the raw structure
        assert_eq!(addr.as_raw().sin_port, 9999u16.to_be());
        assert_eq!(addr.as_raw().sin_addr.s_addr, 0x7f00_0001u32.to_be());
    }

    #[test]
    fn test_std_conversions() {
        let std_addr: SocketAddrV4 = "192.168.1.20:1812".parse().unwrap();

        let addr = Address::from(std_addr);

        assert_eq!(addr.ip(), Ipv4Addr::new(192, 168, 1, 20));
        assert_eq!(addr.port(), 1812);
        assert_eq!(SocketAddrV4::from(addr), std_addr);
        assert_eq!(addr, Address::from_ip(Ipv4Addr::new(192, 168, 1, 20), 1812));
    }

    #[test]
    fn test_special_addresses() {
        assert_eq!(Address::any(80).ip(), Ipv4Addr::UNSPECIFIED);
        assert_eq!(Address::broadcast(67).ip(), Ipv4Addr::BROADCAST);
    }

    #[test]
    fn test_resolve() {
        let addr = Address::resolve("localhost", 123).unwrap();

        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 123);

        let addr = Address::resolve("10.1.2.3", 5).unwrap();

        assert_eq!(addr.ip(), Ipv4Addr::new(10, 1, 2, 3));
    }

    #[test]
    fn test_resolve_failure() {
        assert!(matches!(
            Address::resolve("no-such-host.invalid", 1),
            Err(Error::Resolve { .. })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(Address::new(0x0a00_0001, 53).to_string(), "10.0.0.1:53");
    }

    #[test]
    fn test_keep_alive_defaults() {
        let ka = KeepAlive::default();

        assert_eq!(ka.idle, Duration::from_secs(180));
        assert_eq!(ka.interval, Duration::from_secs(15));
        assert_eq!(ka.count, 9);
    }
}
