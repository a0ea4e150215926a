//! Raw link-layer (`AF_PACKET`) sockets carrying Ethernet frames.
//!
//! Opening a packet socket needs `CAP_NET_RAW`; without it construction
//! fails with a system error (`EPERM`).

use std::{fmt, net::Ipv4Addr};

use libc::sockaddr_ll;

use crate::{address::RawAddress, iface, socket::impl_socket, Handle, Result, WriteMode};

/// Octets in a hardware address.
pub const ETH_ALEN: usize = 6;
/// Octets in an Ethernet header.
pub const ETH_HLEN: usize = 14;
/// Maximum payload octets.
pub const ETH_DATA_LEN: usize = 1500;
/// Maximum frame octets, header included.
pub const ETH_FRAME_LEN: usize = 1514;

/// Link-layer socket address.
pub type Address = crate::address::Address<sockaddr_ll>;

impl RawAddress for sockaddr_ll {
    const FAMILY: libc::c_int = libc::AF_PACKET;

    fn fmt_raw(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "packet:ifindex({}) protocol(0x{:04x})",
            self.sll_ifindex,
            u16::from_be(self.sll_protocol)
        )
    }
}

impl crate::address::Address<sockaddr_ll> {
    /// Binding address for frames of `protocol` addressed to this host on `iface`.
    pub fn link(iface: &str, protocol: u16) -> Result<Self> {
        let index = iface::interface_index(iface)?;

        let mut address = Self::new_zeroed();

        let raw = address.as_raw_mut();

        raw.sll_protocol = protocol.to_be();
        raw.sll_ifindex = index as libc::c_int;
        raw.sll_pkttype = libc::PACKET_HOST as _;

        Ok(address)
    }

    pub fn interface_index(&self) -> u32 {
        self.as_raw().sll_ifindex as u32
    }

    /// Ether type, host byte order.
    pub fn protocol(&self) -> u16 {
        u16::from_be(self.as_raw().sll_protocol)
    }
}

/// An Ethernet frame: header plus up to [`ETH_DATA_LEN`] payload octets.
#[derive(Clone)]
pub struct EtherPacket {
    destination: [u8; ETH_ALEN],
    source: [u8; ETH_ALEN],
    ether_type: u16,
    payload: [u8; ETH_DATA_LEN],
    payload_len: usize,
}

impl Default for EtherPacket {
    fn default() -> Self {
        Self {
            destination: [0; ETH_ALEN],
            source: [0; ETH_ALEN],
            ether_type: 0,
            payload: [0; ETH_DATA_LEN],
            payload_len: 0,
        }
    }
}

impl EtherPacket {
    /// Empty frame (header only).
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame carrying `data`, truncated to [`ETH_DATA_LEN`].
    pub fn with_payload(data: &[u8]) -> Self {
        let mut packet = Self::default();

        packet.set_payload(data);

        packet
    }

    /// Replace the payload; returns the number of octets copied.
    pub fn set_payload(&mut self, data: &[u8]) -> usize {
        let len = data.len().min(ETH_DATA_LEN);

        self.payload[..len].copy_from_slice(&data[..len]);
        self.payload_len = len;

        len
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_len]
    }

    /// Set the destination hardware address; extra octets are ignored and
    /// missing ones keep their previous value.
    pub fn set_destination(&mut self, mac: &[u8]) {
        let len = mac.len().min(ETH_ALEN);

        self.destination[..len].copy_from_slice(&mac[..len]);
    }

    pub fn destination(&self) -> [u8; ETH_ALEN] {
        self.destination
    }

    pub fn source(&self) -> [u8; ETH_ALEN] {
        self.source
    }

    /// Ether type, host byte order.
    pub fn ether_type(&self) -> u16 {
        self.ether_type
    }

    /// Octets on the wire, header included.
    pub fn len(&self) -> usize {
        ETH_HLEN + self.payload_len
    }

    pub fn is_empty(&self) -> bool {
        self.payload_len == 0
    }

    fn to_frame(&self, frame: &mut [u8; ETH_FRAME_LEN]) -> usize {
        frame[..ETH_ALEN].copy_from_slice(&self.destination);
        frame[ETH_ALEN..2 * ETH_ALEN].copy_from_slice(&self.source);
        frame[2 * ETH_ALEN..ETH_HLEN].copy_from_slice(&self.ether_type.to_be_bytes());
        frame[ETH_HLEN..self.len()].copy_from_slice(self.payload());

        self.len()
    }

    /// Parse a received frame. Runt frames yield a zeroed header.
    fn from_frame(frame: &[u8]) -> Self {
        let mut packet = Self::default();

        if frame.len() < ETH_HLEN {
            return packet;
        }

        packet.destination.copy_from_slice(&frame[..ETH_ALEN]);
        packet.source.copy_from_slice(&frame[ETH_ALEN..2 * ETH_ALEN]);
        packet.ether_type = u16::from_be_bytes([frame[2 * ETH_ALEN], frame[2 * ETH_ALEN + 1]]);
        packet.set_payload(&frame[ETH_HLEN..]);

        packet
    }
}

impl fmt::Debug for EtherPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EtherPacket")
            .field("destination", &MacDisplay(&self.destination))
            .field("source", &MacDisplay(&self.source))
            .field("ether_type", &format_args!("0x{:04x}", self.ether_type))
            .field("payload_len", &self.payload_len)
            .finish()
    }
}

struct MacDisplay<'a>(&'a [u8; ETH_ALEN]);

impl fmt::Debug for MacDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;

        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

/// Raw Ethernet socket bound to one interface and protocol.
#[derive(Debug)]
pub struct PacketSocket {
    handle: Handle,
    iface: String,
    protocol: u16,
    mac: [u8; ETH_ALEN],
}

impl PacketSocket {
    /// Open a socket for frames of `protocol` (e.g. `0x0800` for IPv4) on `iface`.
    pub fn new(iface: &str, protocol: u16) -> Result<Self> {
        let addr = Address::link(iface, protocol)?;

        let handle = Handle::open(
            libc::AF_PACKET,
            libc::SOCK_RAW,
            protocol.to_be() as libc::c_int,
        )?;

        handle.bind(&addr)?;

        let mac = iface::hardware_address(handle.check()?, iface)?;

        log::debug!(
            target: "socklib",
            "packet socket iface({}) protocol(0x{:04x}) mac({:?})",
            iface,
            protocol,
            MacDisplay(&mac)
        );

        Ok(Self {
            handle,
            iface: iface.to_owned(),
            protocol,
            mac,
        })
    }

    /// Receive one frame, blocking until one arrives.
    pub fn read_packet(&self) -> Result<EtherPacket> {
        self.recv_packet(0)
    }

    /// Like [`read_packet`](Self::read_packet) but leaves the frame queued.
    pub fn peek_packet(&self) -> Result<EtherPacket> {
        self.recv_packet(libc::MSG_PEEK)
    }

    fn recv_packet(&self, flags: libc::c_int) -> Result<EtherPacket> {
        let mut frame = [0u8; ETH_FRAME_LEN];

        let len = self.handle.recv_from::<sockaddr_ll>(&mut frame, flags, None)?;

        Ok(EtherPacket::from_frame(&frame[..len]))
    }

    /// Send `packet` after stamping this interface's MAC as source and the
    /// socket's protocol as ether type.
    pub fn write_packet(&self, packet: &mut EtherPacket) -> Result<usize> {
        packet.source = self.mac;
        packet.ether_type = self.protocol;

        let mut frame = [0u8; ETH_FRAME_LEN];

        let len = packet.to_frame(&mut frame);

        self.handle.write(&frame[..len], WriteMode::WaitQueued)
    }

    /// Hardware address of the bound interface.
    pub fn mac(&self) -> [u8; ETH_ALEN] {
        self.mac
    }

    /// IPv4 address of the bound interface, `None` when it has none.
    pub fn local_address(&self) -> Result<Option<Ipv4Addr>> {
        iface::ipv4_address_of(self.handle.check()?, &self.iface)
    }

    /// MTU of the bound interface.
    pub fn mtu(&self) -> Result<usize> {
        iface::mtu_of(self.handle.check()?, &self.iface)
    }

    pub fn interface(&self) -> &str {
        &self.iface
    }

    /// Ether type, host byte order.
    pub fn protocol(&self) -> u16 {
        self.protocol
    }
}

impl_socket!(PacketSocket => handle);
