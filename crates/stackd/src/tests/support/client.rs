//! Minimal data-plane and control-plane clients.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use crate::wire::{Action, encode_header};

pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);
const PENDING_PROBE: Duration = Duration::from_millis(150);

/// Opens a connection without sending anything.
pub fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("connect to broker");
    stream
        .set_read_timeout(Some(RESPONSE_TIMEOUT))
        .expect("set client read timeout");
    stream
}

/// Sends a push request and returns the open stream.
pub fn send_push(addr: SocketAddr, payload: &[u8]) -> TcpStream {
    let mut stream = connect(addr);
    let header = encode_header(Action::Push, payload.len()).expect("payload fits");
    stream.write_all(&[header]).expect("write push header");
    stream.write_all(payload).expect("write push payload");
    stream
}

/// Sends a pop request and returns the open stream.
pub fn send_pop(addr: SocketAddr) -> TcpStream {
    let mut stream = connect(addr);
    let header = encode_header(Action::Pop, 0).expect("pop header");
    stream.write_all(&[header]).expect("write pop header");
    stream
}

/// Reads everything the broker sends until it closes the stream.
pub fn read_response(stream: &mut TcpStream) -> Vec<u8> {
    let mut response = Vec::new();
    stream
        .read_to_end(&mut response)
        .expect("read broker response");
    response
}

/// Whether the broker has written or closed anything on `stream` yet.
pub fn has_response(stream: &TcpStream) -> bool {
    stream
        .set_read_timeout(Some(PENDING_PROBE))
        .expect("set probe timeout");
    let mut byte = [0_u8; 1];
    let pending = match stream.peek(&mut byte) {
        Ok(_) => true,
        Err(error) => !matches!(
            error.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        ),
    };
    stream
        .set_read_timeout(Some(RESPONSE_TIMEOUT))
        .expect("restore client read timeout");
    pending
}

/// Sends a control command and waits for the broker to hang up.
pub fn send_control(addr: SocketAddr, command: &[u8]) {
    let mut stream = connect(addr);
    stream.write_all(command).expect("write control command");
    let mut sink = Vec::new();
    let _ = stream.read_to_end(&mut sink);
}
