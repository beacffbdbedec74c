//! Out-of-band control listener.
//!
//! A control connection may send up to three bytes within a short window.
//! The exact sequence `rel` requests a restart of the data-plane server;
//! anything else is ignored.

use std::io::{self, Read};
use std::net::{Shutdown, TcpStream};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::transport::ConnectionHandler;

const CONTROL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::control");

/// Window a control client has to send its command.
pub const CONTROL_READ_WINDOW: Duration = Duration::from_millis(100);

/// Command that triggers a restart.
pub const RESTART_COMMAND: &[u8; 3] = b"rel";

/// Events that drive the process supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessEvent {
    /// Drain the running server and start a fresh one.
    Restart,
    /// Stop everything and exit.
    Shutdown,
}

/// Handler for control-plane connections.
#[derive(Debug)]
pub(crate) struct ControlHandler {
    events: Sender<ProcessEvent>,
}

impl ControlHandler {
    pub(crate) const fn new(events: Sender<ProcessEvent>) -> Self {
        Self { events }
    }
}

impl ConnectionHandler for ControlHandler {
    fn handle(&self, stream: TcpStream) {
        let command = read_command(&stream, CONTROL_READ_WINDOW);
        if let Err(error) = stream.shutdown(Shutdown::Both)
            && error.kind() != io::ErrorKind::NotConnected
        {
            debug!(target: CONTROL_TARGET, error = %error, "control socket shutdown failed");
        }
        match command {
            Ok(bytes) if bytes == RESTART_COMMAND => {
                info!(target: CONTROL_TARGET, "restart requested");
                if self.events.send(ProcessEvent::Restart).is_err() {
                    warn!(target: CONTROL_TARGET, "supervisor gone; restart ignored");
                }
            }
            Ok(bytes) => {
                debug!(target: CONTROL_TARGET, command = ?bytes, "unknown control command ignored");
            }
            Err(error) => {
                debug!(target: CONTROL_TARGET, error = %error, "control read failed");
            }
        }
    }
}

/// Reads up to three bytes, stopping at EOF or when `window` elapses.
fn read_command(stream: &TcpStream, window: Duration) -> io::Result<Vec<u8>> {
    let deadline = Instant::now() + window;
    let mut buf = [0_u8; RESTART_COMMAND.len()];
    let mut filled = 0;
    let mut reader = stream;
    while filled < buf.len() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        reader.set_read_timeout(Some(remaining))?;
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                break;
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
    Ok(buf[..filled].to_vec())
}
