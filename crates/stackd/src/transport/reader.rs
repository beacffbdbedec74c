//! Request pipeline: dispatch of admitted connections to body readers.
//!
//! The dispatcher drains the admission channel and spawns one reader thread
//! per connection, sleeping for the configured stagger between spawns. Each
//! reader pulls the header byte and the declared payload under one overall
//! deadline, then hands the connection to the orchestrator. Any read
//! failure closes the connection and releases it from the pool.

use std::io::Read;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::connection::Connection;
use crate::peer::Peer;
use crate::pool::ConnectionPool;
use crate::queue::QueueService;
use crate::stop::StopSignal;
use crate::wire::{Action, Payload, decode_header};

use super::{LISTENER_TARGET, TransportError};

const DISPATCH_POLL: Duration = Duration::from_millis(100);
const READ_SLICE: Duration = Duration::from_millis(100);

/// Timing knobs for the body readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderSettings {
    /// Overall deadline for reading the header and the payload.
    pub read_deadline: Duration,
    /// Delay between successive reader spawns. Zero disables it.
    pub dispatch_stagger: Duration,
}

/// A fully read request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Request {
    pub(crate) action: Action,
    pub(crate) payload: Payload,
}

/// Shared state of the dispatcher and its body readers.
#[derive(Debug)]
pub(crate) struct RequestPipeline {
    pool: Arc<ConnectionPool>,
    queue: Arc<QueueService<Connection>>,
    settings: ReaderSettings,
    stop: StopSignal,
    in_flight: AtomicUsize,
}

impl RequestPipeline {
    pub(crate) fn new(
        pool: Arc<ConnectionPool>,
        queue: Arc<QueueService<Connection>>,
        settings: ReaderSettings,
        stop: StopSignal,
    ) -> Self {
        Self {
            pool,
            queue,
            settings,
            stop,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Number of body readers still running.
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Starts the dispatch loop. It exits on stop or once every sender of
    /// `inbox` has been dropped.
    pub(crate) fn spawn_dispatcher(
        self: &Arc<Self>,
        inbox: Receiver<Arc<Connection>>,
    ) -> thread::JoinHandle<()> {
        let pipeline = Arc::clone(self);
        thread::spawn(move || pipeline.dispatch(&inbox))
    }

    fn dispatch(self: &Arc<Self>, inbox: &Receiver<Arc<Connection>>) {
        let stagger = self.settings.dispatch_stagger;
        while !self.stop.is_cancelled() {
            let connection = match inbox.recv_timeout(DISPATCH_POLL) {
                Ok(connection) => connection,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            if !stagger.is_zero() && self.stop.wait_timeout(stagger) {
                break;
            }
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            let pipeline = Arc::clone(self);
            thread::spawn(move || {
                pipeline.serve(&connection);
                pipeline.in_flight.fetch_sub(1, Ordering::SeqCst);
            });
        }
        debug!(target: LISTENER_TARGET, "dispatch loop stopped");
    }

    /// Reads one request from `connection` and processes it.
    pub(crate) fn serve(&self, connection: &Arc<Connection>) {
        let read = read_request(
            connection.stream(),
            self.settings.read_deadline,
            &self.stop,
            connection.cancellation(),
        );
        match read {
            Ok(request) => {
                connection.set_action(request.action);
                connection.set_payload(request.payload);
                self.complete(connection);
            }
            Err(error) => {
                debug!(
                    target: LISTENER_TARGET,
                    slot = ?connection.slot_id(),
                    peer = ?connection.peer_addr(),
                    error = %error,
                    "request read failed"
                );
                connection.set_error(error);
                self.fail(connection);
            }
        }
    }

    fn complete(&self, connection: &Arc<Connection>) {
        match self.queue.process_request(connection) {
            Ok(outcome) => {
                if outcome.should_release() {
                    self.pool.release(connection);
                }
            }
            Err(error) => {
                warn!(
                    target: LISTENER_TARGET,
                    slot = ?connection.slot_id(),
                    error = %error,
                    "request rejected"
                );
                self.fail(connection);
            }
        }
    }

    fn fail(&self, connection: &Connection) {
        connection.write_error();
        self.pool.release(connection);
    }
}

/// Reads a header byte and, for pushes, the declared payload.
///
/// `deadline` covers the whole request. Both tokens are checked between
/// read slices so a stop or a close ends the read promptly.
pub(crate) fn read_request(
    stream: &TcpStream,
    deadline: Duration,
    stop: &StopSignal,
    cancel: &StopSignal,
) -> Result<Request, TransportError> {
    let mut reader = DeadlineReader {
        stream,
        deadline: Instant::now() + deadline,
        stop,
        cancel,
    };
    let mut header = [0_u8; 1];
    reader.fill(&mut header)?;
    let header = decode_header(header[0])?;
    let payload = match header.action {
        Action::Pop => Payload::default(),
        Action::Push => {
            let mut body = vec![0_u8; header.payload_len];
            reader.fill(&mut body)?;
            Payload::try_from(body)?
        }
    };
    Ok(Request {
        action: header.action,
        payload,
    })
}

struct DeadlineReader<'a> {
    stream: &'a TcpStream,
    deadline: Instant,
    stop: &'a StopSignal,
    cancel: &'a StopSignal,
}

impl DeadlineReader<'_> {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let mut filled = 0;
        while filled < buf.len() {
            if self.stop.is_cancelled() || self.cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            let remaining = self.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout);
            }
            self.stream
                .set_read_timeout(Some(remaining.min(READ_SLICE)))
                .map_err(TransportError::Io)?;
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(read) => filled += read,
                Err(error) => match TransportError::from(error) {
                    TransportError::Timeout => {}
                    TransportError::Io(error)
                        if error.kind() == std::io::ErrorKind::Interrupted => {}
                    other => return Err(other),
                },
            }
        }
        Ok(())
    }
}
