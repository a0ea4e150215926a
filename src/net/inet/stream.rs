use crate::{
    net::{ServerState, DEFAULT_BACKLOG},
    socket::impl_socket,
    Error, Handle, Result, Timeout,
};

use super::{Address, InetSocket, Reuse, StreamOptions};

/// A connected TCP socket.
///
/// Produced by [`StreamServer::get_connection`], [`StreamSocket::connect`] or
/// by converting a connected [`StreamClient`].
#[derive(Debug)]
pub struct StreamSocket {
    handle: Handle,
}

impl StreamSocket {
    pub(crate) fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }

    /// Open a socket and connect it to `addr`.
    ///
    /// The descriptor is released if the connection fails.
    pub fn connect(addr: &Address) -> Result<Self> {
        let client = StreamClient::new()?;

        client.connect(addr)?;

        Ok(client.into())
    }
}

/// A TCP socket that has not been connected yet.
#[derive(Debug)]
pub struct StreamClient {
    handle: Handle,
}

impl StreamClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            handle: Handle::open(libc::AF_INET, libc::SOCK_STREAM, 0)?,
        })
    }

    /// Blocking connect to `addr`.
    pub fn connect(&self, addr: &Address) -> Result<()> {
        self.handle.connect(addr)
    }
}

impl From<StreamClient> for StreamSocket {
    fn from(mut value: StreamClient) -> Self {
        StreamSocket::from_handle(value.handle.take())
    }
}

/// A listening TCP socket.
#[derive(Debug)]
pub struct StreamServer {
    handle: Handle,
    state: ServerState,
}

impl StreamServer {
    /// Open a server socket bound to `addr`; call [`listen`](Self::listen)
    /// before accepting.
    pub fn new(addr: &Address, reuse: Reuse) -> Result<Self> {
        let mut server = Self::unbound()?;

        server.bind(addr, reuse)?;

        Ok(server)
    }

    /// Open a server socket without binding it.
    pub fn unbound() -> Result<Self> {
        Ok(Self {
            handle: Handle::open(libc::AF_INET, libc::SOCK_STREAM, 0)?,
            state: ServerState::Unbound,
        })
    }

    /// Bind to `addr`. A failed bind leaves the server unbound, so the call
    /// may be retried, e.g. with another port.
    pub fn bind(&mut self, addr: &Address, reuse: Reuse) -> Result<()> {
        if self.state != ServerState::Unbound {
            return Err(Error::InvalidArgument("server is already bound"));
        }

        if reuse == Reuse::Reuse {
            self.handle.set_option(
                libc::SOL_SOCKET,
                libc::SO_REUSEADDR,
                1,
                "setsockopt(SO_REUSEADDR)",
            )?;
        }

        self.handle.bind(addr)?;

        self.state = ServerState::Bound;

        Ok(())
    }

    /// Start listening with room for `backlog` pending connections.
    ///
    /// The server must be bound first.
    pub fn set_listen(&mut self, backlog: i32) -> Result<()> {
        if self.state == ServerState::Unbound {
            return Err(Error::InvalidArgument("server is not bound"));
        }

        self.handle.listen(backlog)?;

        log::debug!(
            target: "socklib",
            "fd({}) listening backlog({})",
            std::os::fd::AsRawFd::as_raw_fd(&self.handle),
            backlog
        );

        self.state = ServerState::Listening;

        Ok(())
    }

    /// Start listening with [`DEFAULT_BACKLOG`].
    pub fn listen(&mut self) -> Result<()> {
        self.set_listen(DEFAULT_BACKLOG)
    }

    /// Wait up to `timeout` for a client and accept it.
    ///
    /// Returns `None` when no client arrived in time. The peer address is
    /// written to `origin` when given.
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
}

impl_socket!(
    StreamSocket => handle,
    StreamClient => handle,
    StreamServer => handle,
);

impl InetSocket for StreamSocket {}
impl InetSocket for StreamClient {}
impl InetSocket for StreamServer {}

impl StreamOptions for StreamSocket {}
impl StreamOptions for StreamClient {}
