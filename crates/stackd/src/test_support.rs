//! Helpers shared by unit tests.

use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::connection::Connection;
use crate::peer::Peer;
use crate::wire::{Action, Payload};

pub(crate) const WAIT_TIMEOUT: Duration = Duration::from_secs(3);

/// Connects a client to a throwaway listener and returns `(client, server)`.
pub(crate) fn loopback_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind loopback listener");
    let addr = listener.local_addr().expect("listener address");
    let client = TcpStream::connect(addr).expect("connect client");
    let (server, _) = listener.accept().expect("accept client");
    (client, server)
}

/// Builds a connection handle with the given age and returns its client end.
pub(crate) fn connection_aged(age_secs: u64) -> (TcpStream, Arc<Connection>) {
    let (client, server) = loopback_pair();
    let accepted_at = crate::connection::epoch_seconds().saturating_sub(age_secs);
    (client, Arc::new(Connection::with_accepted_at(server, accepted_at)))
}

/// Reads until the peer closes the stream.
pub(crate) fn read_to_close(client: &mut TcpStream) -> Vec<u8> {
    client
        .set_read_timeout(Some(WAIT_TIMEOUT))
        .expect("set client timeout");
    let mut response = Vec::new();
    client.read_to_end(&mut response).expect("read response");
    response
}

/// Polls `condition` until it holds or [`WAIT_TIMEOUT`] elapses.
pub(crate) fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Response recorded by a [`FakePeer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Response {
    PushAck,
    Pop(Payload),
    Busy,
    Error,
}

/// In-memory [`Peer`] that records every response it is sent.
#[derive(Debug)]
pub(crate) struct FakePeer {
    slot: usize,
    action: Option<Action>,
    payload: Payload,
    alive: AtomicBool,
    responses: Mutex<Vec<Response>>,
}

impl FakePeer {
    fn build(slot: usize, action: Option<Action>, payload: Payload) -> Arc<Self> {
        Arc::new(Self {
            slot,
            action,
            payload,
            alive: AtomicBool::new(true),
            responses: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn push(slot: usize, bytes: &[u8]) -> Arc<Self> {
        let payload = Payload::try_from(bytes).expect("payload within limit");
        Self::build(slot, Some(Action::Push), payload)
    }

    pub(crate) fn pop(slot: usize) -> Arc<Self> {
        Self::build(slot, Some(Action::Pop), Payload::default())
    }

    pub(crate) fn without_action(slot: usize) -> Arc<Self> {
        Self::build(slot, None, Payload::default())
    }

    pub(crate) fn disconnect(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub(crate) fn responses(&self) -> Vec<Response> {
        self.responses.lock().expect("responses mutex poisoned").clone()
    }

    fn record(&self, response: Response) {
        self.responses
            .lock()
            .expect("responses mutex poisoned")
            .push(response);
    }
}

impl Peer for FakePeer {
    fn slot_id(&self) -> Option<usize> {
        Some(self.slot)
    }

    fn action(&self) -> Option<Action> {
        self.action
    }

    fn payload(&self) -> Payload {
        self.payload.clone()
    }

    fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn probe_liveness(&self) -> bool {
        self.is_alive()
    }

    fn write_push_ack(&self) {
        self.record(Response::PushAck);
        self.disconnect();
    }

    fn write_pop_response(&self, payload: &Payload) {
        self.record(Response::Pop(payload.clone()));
        self.disconnect();
    }

    fn write_busy(&self) {
        self.record(Response::Busy);
    }

    fn write_error(&self) {
        self.record(Response::Error);
        self.disconnect();
    }
}

pub(crate) fn payload(bytes: &[u8]) -> Payload {
    Payload::try_from(bytes).expect("payload within limit")
}
