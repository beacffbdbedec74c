//! Non-consuming liveness probe.
//!
//! The probe peeks at most one byte without blocking. It must not change the
//! socket's read timeout: the body reader relies on that timeout for its own
//! deadline while the pool sweep probes the same socket.

use std::io;
use std::net::TcpStream;

/// Returns `false` when the peer has closed the stream or the socket has
/// failed; pending request bytes stay queued for the body reader.
pub(super) fn remote_is_open(stream: &TcpStream) -> bool {
    classify(peek_nonblocking(stream))
}

fn classify(result: io::Result<usize>) -> bool {
    match result {
        Ok(0) => false,
        Ok(_) => true,
        Err(error) => matches!(
            error.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
        ),
    }
}

#[cfg(unix)]
fn peek_nonblocking(stream: &TcpStream) -> io::Result<usize> {
    use std::mem::MaybeUninit;

    use socket2::SockRef;

    let socket = SockRef::from(stream);
    let mut buf = [MaybeUninit::<u8>::uninit(); 1];
    socket.recv_with_flags(&mut buf, libc::MSG_PEEK | libc::MSG_DONTWAIT)
}

#[cfg(not(unix))]
fn peek_nonblocking(stream: &TcpStream) -> io::Result<usize> {
    stream.set_nonblocking(true)?;
    let mut buf = [0_u8; 1];
    let result = stream.peek(&mut buf);
    stream.set_nonblocking(false)?;
    result
}
