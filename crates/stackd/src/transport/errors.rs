//! Error types for listener and request-reading operations.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::wire::ProtocolError;

/// Errors surfaced while binding or running a socket listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Resolving the configured host failed.
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
        /// Underlying resolver error.
        #[source]
        source: io::Error,
    },
    /// The host resolved to no usable address.
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
    },
    /// Binding the resolved address failed.
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        /// Address the bind was attempted on.
        addr: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Switching the listener to non-blocking mode failed.
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The accept loop panicked.
    #[error("listener thread panicked")]
    ThreadPanic,
}

/// Errors that end the read phase of a data-plane request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The overall read deadline elapsed.
    #[error("read deadline elapsed")]
    Timeout,
    /// The peer closed the stream before the request was complete.
    #[error("peer closed the connection mid-request")]
    Closed,
    /// The socket reported an error.
    #[error("socket read failed: {0}")]
    Io(#[source] io::Error),
    /// The request could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The server or the connection was stopped while reading.
    #[error("read cancelled by shutdown")]
    Cancelled,
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::Timeout,
            io::ErrorKind::UnexpectedEof => Self::Closed,
            _ => Self::Io(error),
        }
    }
}
