use std::ops::{Deref, DerefMut};

use crate::{iface, socket::impl_socket, Handle, Result};

use super::{Address, InetSocket};

/// A UDP socket.
#[derive(Debug)]
pub struct DatagramSocket {
    handle: Handle,
}

impl DatagramSocket {
    /// Unbound socket; the kernel picks an ephemeral port on first send.
    pub fn new() -> Result<Self> {
        Ok(Self {
            handle: Handle::open(libc::AF_INET, libc::SOCK_DGRAM, 0)?,
        })
    }

    /// Socket bound to `addr`.
    pub fn bind(addr: &Address) -> Result<Self> {
        let socket = Self::new()?;

        socket.handle.bind(addr)?;

        Ok(socket)
    }

    /// Receive one datagram, blocking until one arrives.
    ///
    /// The sender is written to `origin` when given. A datagram larger than
    /// `buf` is truncated.
    pub fn read_message(&self, buf: &mut [u8], origin: Option<&mut Address>) -> Result<usize> {
        self.handle.recv_from(buf, libc::MSG_NOSIGNAL, origin)
    }

    /// Like [`read_message`](Self::read_message) but leaves the datagram queued.
    pub fn peek_message(&self, buf: &mut [u8], origin: Option<&mut Address>) -> Result<usize> {
        self.handle
            .recv_from(buf, libc::MSG_NOSIGNAL | libc::MSG_PEEK, origin)
    }

    /// Send one datagram to `dest`, or to the connected peer when `None`.
    pub fn write_message(&self, buf: &[u8], dest: Option<&Address>) -> Result<usize> {
        self.handle.send_to(buf, dest)
    }

    /// Restrict the socket to `addr`: sends without a destination go there
    /// and only datagrams from it are received.
    pub fn connect(&self, addr: &Address) -> Result<()> {
        self.handle.connect(addr)
    }

    /// Permit or forbid sending to broadcast addresses.
    pub fn allow_broadcast(&self, allow: bool) -> Result<()> {
        self.handle.set_option(
            libc::SOL_SOCKET,
            libc::SO_BROADCAST,
            allow as libc::c_int,
            "setsockopt(SO_BROADCAST)",
        )
    }
}

/// A UDP socket receiving from multicast groups.
#[derive(Debug)]
pub struct MulticastSocket {
    inner: DatagramSocket,
}

impl MulticastSocket {
    pub fn new() -> Result<Self> {
        Ok(Self {
            inner: DatagramSocket::new()?,
        })
    }

    /// Bind to `group` and register membership, optionally on one interface.
    ///
    /// Local address reuse is enabled first, so several sockets on the host
    /// may join the same group and port.
    pub fn join(&self, group: &Address, iface: Option<&str>) -> Result<()> {
        let handle = &self.inner.handle;

        handle.set_option(
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            1,
            "setsockopt(SO_REUSEADDR)",
        )?;

        handle.bind(group)?;

        let mreq = membership(group, iface)?;

        if iface.is_some() {
            handle.set_option_raw(
                libc::IPPROTO_IP,
                libc::IP_MULTICAST_IF,
                &mreq,
                "setsockopt(IP_MULTICAST_IF)",
            )?;
        }

        handle.set_option_raw(
            libc::IPPROTO_IP,
            libc::IP_ADD_MEMBERSHIP,
            &mreq,
            "setsockopt(IP_ADD_MEMBERSHIP)",
        )?;

        log::debug!(target: "socklib", "join multicast group {:?} iface({:?})", group, iface);

        Ok(())
    }

    /// Drop membership of `group`.
    pub fn leave(&self, group: &Address, iface: Option<&str>) -> Result<()> {
        let mreq = membership(group, iface)?;

        self.inner.handle.set_option_raw(
            libc::IPPROTO_IP,
            libc::IP_DROP_MEMBERSHIP,
            &mreq,
            "setsockopt(IP_DROP_MEMBERSHIP)",
        )?;

        log::debug!(target: "socklib", "leave multicast group {:?}", group);

        Ok(())
    }

    /// Hop limit for outgoing multicast datagrams.
    pub fn set_outgoing_ttl(&self, ttl: u8) -> Result<()> {
        self.inner.handle.set_option(
            libc::IPPROTO_IP,
            libc::IP_MULTICAST_TTL,
            ttl as libc::c_int,
            "setsockopt(IP_MULTICAST_TTL)",
        )
    }
}

fn membership(group: &Address, iface: Option<&str>) -> Result<libc::ip_mreqn> {
    let ifindex = match iface {
        Some(name) => iface::interface_index(name)? as libc::c_int,
        None => 0,
    };

    Ok(libc::ip_mreqn {
        imr_multiaddr: group.as_raw().sin_addr,
        imr_address: libc::in_addr {
            s_addr: libc::INADDR_ANY,
        },
        imr_ifindex: ifindex,
    })
}

impl Deref for MulticastSocket {
    type Target = DatagramSocket;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for MulticastSocket {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

/// A UDP socket that sends to the limited broadcast address.
///
/// Sending to broadcast usually needs elevated privilege; without it
/// [`write_message`](Self::write_message) fails with a system error.
#[derive(Debug)]
pub struct BroadcastSocket {
    inner: DatagramSocket,
    port: u16,
}

impl BroadcastSocket {
    /// Socket sending to `255.255.255.255:port`.
    pub fn new(port: u16) -> Result<Self> {
        let inner = DatagramSocket::new()?;

        inner.allow_broadcast(true)?;

        Ok(Self { inner, port })
    }

    pub fn write_message(&self, buf: &[u8]) -> Result<usize> {
        self.inner
            .write_message(buf, Some(&Address::broadcast(self.port)))
    }

    pub fn read_message(&self, buf: &mut [u8], origin: Option<&mut Address>) -> Result<usize> {
        self.inner.read_message(buf, origin)
    }

    /// Destination port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl_socket!(
    DatagramSocket => handle,
    MulticastSocket => inner.handle,
    BroadcastSocket => inner.handle,
);

impl InetSocket for DatagramSocket {}
impl InetSocket for MulticastSocket {}
impl InetSocket for BroadcastSocket {}
