//! Connection handling abstraction for the accept loop.

use std::net::TcpStream;

/// Handles accepted socket connections.
pub(crate) trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection on the accept thread. Implementations
    /// should avoid panicking and must not block for long.
    fn handle(&self, stream: TcpStream);
}
