#![doc = include_str!("../README.md")]

#[cfg(not(target_os = "linux"))]
compile_error!("socklib relies on Linux socket facilities (abstract namespace, AF_PACKET, MSG_NOSIGNAL)");

mod address;
mod error;
mod handle;
mod io;
mod poller;
mod socket;
mod timeout;

pub mod iface;
pub mod net;

pub use address::{Address, RawAddress};
pub use error::{Error, Result};
pub use handle::Handle;
pub use net::{ServerState, DEFAULT_BACKLOG};
pub use poller::wait_event;
pub use socket::Socket;
pub use timeout::{BufferKind, IoMode, Timeout, WaitEvent, WriteMode};
