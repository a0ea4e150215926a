use crate::{
    net::{ServerState, DEFAULT_BACKLOG},
    socket::impl_socket,
    Handle, Result, Timeout,
};

use super::{terminate_and_unlink, Address};

/// A connected UNIX stream socket.
#[derive(Debug)]
pub struct StreamSocket {
    handle: Handle,
}

impl StreamSocket {
    pub(crate) fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }

    /// Open a socket and connect it to the server at `addr`.
    pub fn connect(addr: &Address) -> Result<Self> {
        let client = StreamClient::new()?;

        client.connect(addr)?;

        Ok(client.into())
    }

    /// Two sockets connected to each other.
    pub fn pair() -> Result<(Self, Self)> {
        let (a, b) = Handle::pair(libc::AF_UNIX, libc::SOCK_STREAM)?;

        Ok((Self::from_handle(a), Self::from_handle(b)))
    }

    pub fn local_address(&self) -> Result<Address> {
        self.handle.local_address()
    }

    pub fn peer_address(&self) -> Result<Address> {
        self.handle.peer_address()
    }
}

/// A UNIX stream socket that has not been connected yet.
#[derive(Debug)]
pub struct StreamClient {
    handle: Handle,
}

impl StreamClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            handle: Handle::open(libc::AF_UNIX, libc::SOCK_STREAM, 0)?,
        })
    }

    pub fn connect(&self, addr: &Address) -> Result<()> {
        self.handle.connect(addr)
    }
}

impl From<StreamClient> for StreamSocket {
    fn from(mut value: StreamClient) -> Self {
        StreamSocket::from_handle(value.handle.take())
    }
}

/// A listening UNIX stream socket.
///
/// When dropped the server removes its filesystem path, if it has one.
#[derive(Debug)]
pub struct StreamServer {
    handle: Handle,
    state: ServerState,
}

impl StreamServer {
    /// Open a server socket bound to `addr`.
    pub fn new(addr: &Address) -> Result<Self> {
        let handle = Handle::open(libc::AF_UNIX, libc::SOCK_STREAM, 0)?;

        handle.bind(addr)?;

        Ok(Self {
            handle,
            state: ServerState::Bound,
        })
    }

    pub fn set_listen(&mut self, backlog: i32) -> Result<()> {
        self.handle.listen(backlog)?;

        self.state = ServerState::Listening;

        Ok(())
    }

    /// Start listening with [`DEFAULT_BACKLOG`].
    pub fn listen(&mut self) -> Result<()> {
        self.set_listen(DEFAULT_BACKLOG)
    }

    /// Wait up to `timeout` for a client and accept it.
    pub fn get_connection(
        &self,
        timeout: Timeout,
        origin: Option<&mut Address>,
    ) -> Result<Option<StreamSocket>> {
        Ok(self
            .handle
            .accept(timeout, origin)?
            .map(StreamSocket::from_handle))
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn local_address(&self) -> Result<Address> {
        self.handle.local_address()
    }
}

impl Drop for StreamServer {
    fn drop(&mut self) {
        terminate_and_unlink(&mut self.handle);
    }
}

impl_socket!(
    StreamSocket => handle,
    StreamClient => handle,
    StreamServer => handle,
);
