//! Error taxonomy shared by every socket type.

use std::io;

use errno::errno;

/// Errors returned by socket operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller supplied an unusable argument. Raised before any syscall.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The handle was closed, moved out, or its descriptor now refers to another file.
    #[error("invalid socket handle")]
    InvalidState,

    /// An OS call failed.
    #[error("{op}: {source}")]
    System {
        /// Name of the failing call.
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// Host name could not be resolved.
    #[error("resolve({host}): {message}")]
    Resolve { host: String, message: String },
}

impl Error {
    /// Capture the current `errno` for the failing call `op`.
    pub(crate) fn last_os_error(op: &'static str) -> Self {
        let e = errno();

        Error::System {
            op,
            source: io::Error::from_raw_os_error(e.0),
        }
    }

    pub(crate) fn from_raw_os_error(op: &'static str, code: i32) -> Self {
        Error::System {
            op,
            source: io::Error::from_raw_os_error(code),
        }
    }

    /// OS error code, if this is a system error.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::System { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// Returns true for `EAGAIN` / `EWOULDBLOCK`.
    pub fn is_would_block(&self) -> bool {
        matches!(
            self.raw_os_error(),
            Some(code) if code == libc::EAGAIN || code == libc::EWOULDBLOCK
        )
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidArgument(_) => io::Error::new(io::ErrorKind::InvalidInput, err),
            Error::InvalidState => io::Error::new(io::ErrorKind::NotConnected, err),
            Error::System { source, .. } => source,
            Error::Resolve { .. } => io::Error::new(io::ErrorKind::NotFound, err),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_would_block() {
        let err = Error::from_raw_os_error("send", libc::EAGAIN);

        assert!(err.is_would_block());
        assert_eq!(err.raw_os_error(), Some(libc::EAGAIN));

        assert!(!Error::InvalidState.is_would_block());
    }

    #[test]
    fn test_into_io_error() {
        let err: io::Error = Error::from_raw_os_error("recv", libc::ECONNRESET).into();

        assert_eq!(err.raw_os_error(), Some(libc::ECONNRESET));

        let err: io::Error = Error::InvalidArgument("buffer is empty").into();

        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_display_names_op() {
        let err = Error::from_raw_os_error("bind", libc::EADDRINUSE);

        assert!(err.to_string().starts_with("bind: "));
    }
}
