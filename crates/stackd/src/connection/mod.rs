//! Per-connection handle shared by the listener, pool, body reader and
//! orchestrator.
//!
//! All mutable state sits behind one mutex owned by the handle. Socket I/O
//! goes through `&TcpStream`, so a body reader blocked in `read` never holds
//! the state lock that the pool sweep or the orchestrator need.

mod probe;

use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::peer::Peer;
use crate::stop::StopSignal;
use crate::transport::TransportError;
use crate::wire::{Action, BUSY, PUSH_ACK, Payload, encode_pop_response};

const CONNECTION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::connection");
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Seconds since the Unix epoch, saturating to zero on clock skew.
pub(crate) fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

#[derive(Debug, Default)]
struct ConnectionState {
    slot_id: Option<usize>,
    alive: bool,
    closed: bool,
    action: Option<Action>,
    payload: Payload,
    last_error: Option<TransportError>,
}

/// An accepted data-plane stream and its request state.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer_addr: Option<SocketAddr>,
    accepted_at: u64,
    cancel: StopSignal,
    state: Mutex<ConnectionState>,
}

impl Connection {
    /// Wraps a freshly accepted stream, stamping it with the current time.
    #[must_use]
    pub fn accept(stream: TcpStream) -> Self {
        Self::with_accepted_at(stream, epoch_seconds())
    }

    /// Wraps a stream with an explicit acceptance timestamp in epoch seconds.
    #[must_use]
    pub fn with_accepted_at(stream: TcpStream, accepted_at: u64) -> Self {
        if let Err(error) = stream.set_nodelay(true) {
            debug!(target: CONNECTION_TARGET, error = %error, "failed to disable nagle");
        }
        if let Err(error) = stream.set_write_timeout(Some(WRITE_TIMEOUT)) {
            debug!(target: CONNECTION_TARGET, error = %error, "failed to set write timeout");
        }
        let peer_addr = stream.peer_addr().ok();
        Self {
            stream,
            peer_addr,
            accepted_at,
            cancel: StopSignal::new(),
            state: Mutex::new(ConnectionState {
                alive: true,
                ..ConnectionState::default()
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remote address captured at acceptance.
    #[must_use]
    pub const fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Acceptance time in epoch seconds.
    #[must_use]
    pub const fn accepted_at(&self) -> u64 {
        self.accepted_at
    }

    /// Age relative to `now`, both in epoch seconds.
    #[must_use]
    pub const fn age_at(&self, now: u64) -> Duration {
        Duration::from_secs(now.saturating_sub(self.accepted_at))
    }

    /// Token cancelled when the connection is closed.
    #[must_use]
    pub const fn cancellation(&self) -> &StopSignal {
        &self.cancel
    }

    pub(crate) const fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub(crate) fn set_slot_id(&self, slot_id: usize) {
        self.lock_state().slot_id = Some(slot_id);
    }

    /// Records the decoded action.
    pub fn set_action(&self, action: Action) {
        self.lock_state().action = Some(action);
    }

    /// Records the request payload.
    pub fn set_payload(&self, payload: Payload) {
        self.lock_state().payload = payload;
    }

    /// Records the error that ended the read phase.
    pub fn set_error(&self, error: TransportError) {
        self.lock_state().last_error = Some(error);
    }

    /// Takes the recorded read error, if any.
    pub fn take_error(&self) -> Option<TransportError> {
        self.lock_state().last_error.take()
    }

    /// Whether [`Connection::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    /// Shuts the socket down and cancels the connection token. Idempotent.
    pub fn close(&self) {
        {
            let mut state = self.lock_state();
            state.alive = false;
            if state.closed {
                return;
            }
            state.closed = true;
        }
        if let Err(error) = self.stream.shutdown(Shutdown::Both)
            && error.kind() != io::ErrorKind::NotConnected
        {
            debug!(
                target: CONNECTION_TARGET,
                peer = ?self.peer_addr,
                error = %error,
                "socket shutdown failed"
            );
        }
        self.cancel.cancel();
    }

    fn send(&self, bytes: &[u8], response: &'static str) {
        if self.is_closed() {
            debug!(
                target: CONNECTION_TARGET,
                peer = ?self.peer_addr,
                response,
                "skipping response on closed connection"
            );
            return;
        }
        let mut stream = &self.stream;
        if let Err(error) = stream.write_all(bytes).and_then(|()| stream.flush()) {
            warn!(
                target: CONNECTION_TARGET,
                peer = ?self.peer_addr,
                slot = ?self.slot_id(),
                response,
                error = %error,
                "failed to write response"
            );
        }
    }
}

impl Peer for Connection {
    fn slot_id(&self) -> Option<usize> {
        self.lock_state().slot_id
    }

    fn action(&self) -> Option<Action> {
        self.lock_state().action
    }

    fn payload(&self) -> Payload {
        self.lock_state().payload.clone()
    }

    fn set_alive(&self, alive: bool) {
        self.lock_state().alive = alive;
    }

    fn is_alive(&self) -> bool {
        self.lock_state().alive
    }

    fn probe_liveness(&self) -> bool {
        let mut state = self.lock_state();
        if !state.alive {
            return false;
        }
        let alive = probe::remote_is_open(&self.stream);
        if !alive {
            state.alive = false;
        }
        alive
    }

    fn write_push_ack(&self) {
        self.send(&[PUSH_ACK], "push_ack");
        self.close();
    }

    fn write_pop_response(&self, payload: &Payload) {
        self.send(&encode_pop_response(payload), "pop");
        self.close();
    }

    fn write_busy(&self) {
        self.send(&[BUSY], "busy");
    }

    fn write_error(&self) {
        self.close();
    }
}
