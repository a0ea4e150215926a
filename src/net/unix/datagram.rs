use crate::{socket::impl_socket, Handle, Result};

use super::{terminate_and_unlink, Address};

/// A UNIX datagram socket.
///
/// When dropped the socket removes its filesystem path, if it has one.
#[derive(Debug)]
pub struct DatagramSocket {
    handle: Handle,
}

impl DatagramSocket {
    /// Client socket bound to a random name in the abstract namespace, so
    /// servers can reply to it.
    ///
    /// Names are not checked for uniqueness; a collision surfaces as
    /// `EADDRINUSE` from `bind`.
    pub fn new() -> Result<Self> {
        let name = format!("{}{}", rand::random::<u32>(), rand::random::<u32>());

        Self::bind(&Address::abstract_name(&name))
    }

    /// Server socket bound to `addr`.
    pub fn bind(addr: &Address) -> Result<Self> {
        let handle = Handle::open(libc::AF_UNIX, libc::SOCK_DGRAM, 0)?;

        handle.bind(addr)?;

        Ok(Self { handle })
    }

    /// Two unnamed sockets connected to each other.
    pub fn pair() -> Result<(Self, Self)> {
        let (a, b) = Handle::pair(libc::AF_UNIX, libc::SOCK_DGRAM)?;

        Ok((Self { handle: a }, Self { handle: b }))
    }

    /// Receive one datagram, blocking until one arrives.
    pub fn read_message(&self, buf: &mut [u8], origin: Option<&mut Address>) -> Result<usize> {
        self.handle.recv_from(buf, 0, origin)
    }

    /// Like [`read_message`](Self::read_message) but leaves the datagram queued.
    pub fn peek_message(&self, buf: &mut [u8], origin: Option<&mut Address>) -> Result<usize> {
        self.handle.recv_from(buf, libc::MSG_PEEK, origin)
    }

    /// Send one datagram to `dest`, or to the connected peer when `None`.
    pub fn write_message(&self, buf: &[u8], dest: Option<&Address>) -> Result<usize> {
        self.handle.send_to(buf, dest)
    }

    pub fn connect(&self, addr: &Address) -> Result<()> {
        self.handle.connect(addr)
    }

    pub fn local_address(&self) -> Result<Address> {
        self.handle.local_address()
    }
}

impl Drop for DatagramSocket {
    fn drop(&mut self) {
        terminate_and_unlink(&mut self.handle);
    }
}

impl_socket!(DatagramSocket => handle);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Socket;

    #[test]
    fn test_client_gets_abstract_name() {
        let client = DatagramSocket::new().unwrap();

        let addr = client.local_address().unwrap();

        assert!(addr.is_abstract());
    }

    #[test]
    fn test_reply_to_origin() {
        let server_addr = Address::abstract_name(&format!("socklib-dgram-{}", std::process::id()));

        let server = DatagramSocket::bind(&server_addr).unwrap();
        let client = DatagramSocket::new().unwrap();

        client.write_message(b"request", Some(&server_addr)).unwrap();

        let mut buf = [0u8; 32];
        let mut origin = Address::default();

        let len = server.read_message(&mut buf, Some(&mut origin)).unwrap();

        assert_eq!(&buf[..len], b"request");
        assert_eq!(origin, client.local_address().unwrap());

        server.write_message(b"reply", Some(&origin)).unwrap();

        assert_eq!(client.peek_message(&mut buf, None).unwrap(), 5);
        assert_eq!(client.pending().unwrap(), 5);
        assert_eq!(client.read_message(&mut buf, None).unwrap(), 5);
        assert_eq!(&buf[..5], b"reply");
    }

    #[test]
    fn test_connected_pair() {
        let (a, b) = DatagramSocket::pair().unwrap();

        a.write_message(b"one", None).unwrap();
        a.write_message(b"two", None).unwrap();

        let mut buf = [0u8; 8];

        // datagram boundaries are kept
        assert_eq!(b.read_message(&mut buf, None).unwrap(), 3);
        assert_eq!(b.read_message(&mut buf, None).unwrap(), 3);
        assert_eq!(&buf[..3], b"two");
    }
}
