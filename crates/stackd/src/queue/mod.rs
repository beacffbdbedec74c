//! Request orchestration between fully read connections and the store.
//!
//! Producers blocked on a full stack are woken synchronously inside
//! [`Store::pop`]. Consumers blocked on an empty stack are woken by a poll
//! that runs once per interval, so they can wait up to one interval longer
//! than a producer would.
//!
//! Connections answered on behalf of another request (a parked producer
//! refilled by a pop, a parked consumer served by the poll) are handed to
//! the release hook so their pool slot frees up without waiting for the
//! sweep.


use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::peer::Peer;
use crate::stop::StopSignal;
use crate::store::{PushOutcome, Store};
use crate::wire::Action;

const QUEUE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::queue");

/// Errors returned by [`QueueService::process_request`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The connection reached the orchestrator without a decoded action.
    #[error("no handler registered for request on slot {slot:?}")]
    UnregisteredAction {
        /// Pool slot of the offending connection.
        slot: Option<usize>,
    },
    /// The stack was full and too many producers were already parked.
    #[error("{limit} writers already parked; push refused")]
    WriterOverflow {
        /// Maximum number of parked writers.
        limit: usize,
    },
}

/// Successful outcome of [`QueueService::process_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The response was written and the connection closed.
    Completed,
    /// The connection was parked on a wait list.
    Parked,
    /// The peer had already gone away; the pool sweep cleans it up.
    Stale,
}

impl RequestOutcome {
    /// Whether the caller should release the connection from the pool.
    #[must_use]
    pub const fn should_release(self) -> bool {
        matches!(self, Self::Completed)
    }
}

type ReleaseHook<P> = Box<dyn Fn(&P) + Send + Sync>;

/// The store plus the consumers parked on it.
pub struct QueueService<P> {
    store: Store<P>,
    waiting_readers: Mutex<VecDeque<Arc<P>>>,
    release: Option<ReleaseHook<P>>,
}

impl<P: fmt::Debug> fmt::Debug for QueueService<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueService")
            .field("store", &self.store)
            .field("waiting_readers", &self.waiting_readers)
            .field("release", &self.release.is_some())
            .finish()
    }
}

impl<P: Peer> QueueService<P> {
    /// Builds an orchestrator around an empty store of `stack_length` slots,
    /// parking at most `max_waiting_writers` producers.
    #[must_use]
    pub fn new(stack_length: usize, max_waiting_writers: usize) -> Self {
        Self {
            store: Store::new(stack_length, max_waiting_writers),
            waiting_readers: Mutex::new(VecDeque::new()),
            release: None,
        }
    }

    /// Installs the hook called for every parked connection that has been
    /// answered. It runs with no queue or store lock held.
    #[must_use]
    pub fn with_release(mut self, hook: impl Fn(&P) + Send + Sync + 'static) -> Self {
        self.release = Some(Box::new(hook));
        self
    }

    fn release_served(&self, peer: &P) {
        if let Some(release) = &self.release {
            release(peer);
        }
    }

    fn readers(&self) -> MutexGuard<'_, VecDeque<Arc<P>>> {
        self.waiting_readers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &Store<P> {
        &self.store
    }

    /// Number of parked consumers.
    #[must_use]
    pub fn waiting_readers(&self) -> usize {
        self.readers().len()
    }

    /// Executes the request carried by `peer`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::UnregisteredAction`] when `peer` has no decoded
    /// action and [`QueueError::WriterOverflow`] when a push cannot even be
    /// parked. The caller releases and closes the connection in both cases.
    pub fn process_request(&self, peer: &Arc<P>) -> Result<RequestOutcome, QueueError> {
        if !peer.probe_liveness() {
            debug!(target: QUEUE_TARGET, slot = ?peer.slot_id(), "peer gone before processing");
            return Ok(RequestOutcome::Stale);
        }
        match peer.action() {
            Some(Action::Pop) => Ok(self.pop_for(peer)),
            Some(Action::Push) => self.push_for(peer),
            None => Err(QueueError::UnregisteredAction {
                slot: peer.slot_id(),
            }),
        }
    }

    fn pop_for(&self, peer: &Arc<P>) -> RequestOutcome {
        if let Some(popped) = self.store.pop_refilling() {
            peer.write_pop_response(&popped.payload);
            if let Some(writer) = &popped.refilled_by {
                self.release_served(writer);
            }
            return RequestOutcome::Completed;
        }
        let mut readers = self.readers();
        readers.push_back(Arc::clone(peer));
        info!(
            target: QUEUE_TARGET,
            slot = ?peer.slot_id(),
            waiting = readers.len(),
            "stack empty; reader parked"
        );
        RequestOutcome::Parked
    }

    fn push_for(&self, peer: &Arc<P>) -> Result<RequestOutcome, QueueError> {
        match self.store.push_or_wait(peer) {
            PushOutcome::Accepted => {
                peer.set_alive(false);
                peer.write_push_ack();
                Ok(RequestOutcome::Completed)
            }
            PushOutcome::Waiting => Ok(RequestOutcome::Parked),
            PushOutcome::Overflow => Err(QueueError::WriterOverflow {
                limit: self.store.max_waiting_writers(),
            }),
        }
    }

    /// Hands one popped payload to the oldest parked consumer.
    ///
    /// Does nothing unless a consumer is parked and the store is non-empty.
    /// A consumer that went away loses the payload. Returns whether a payload
    /// was taken from the store.
    pub fn service_waiting_reader(&self) -> bool {
        let Some(reader) = self.readers().pop_front() else {
            return false;
        };
        let Some(popped) = self.store.pop_refilling() else {
            self.readers().push_front(reader);
            return false;
        };
        if let Some(writer) = &popped.refilled_by {
            self.release_served(writer);
        }

        if reader.probe_liveness() {
            reader.write_pop_response(&popped.payload);
            info!(target: QUEUE_TARGET, slot = ?reader.slot_id(), "parked reader served");
            self.release_served(&reader);
        } else {
            warn!(
                target: QUEUE_TARGET,
                slot = ?reader.slot_id(),
                len = popped.payload.len(),
                "parked reader disconnected; payload dropped"
            );
        }
        true
    }

    /// Starts the consumer wake-up poll. Exits when `stop` is cancelled.
    pub fn spawn_reader_poller(
        self: &Arc<Self>,
        interval: Duration,
        stop: StopSignal,
    ) -> thread::JoinHandle<()>
    where
        P: 'static,
    {
        let queue = Arc::clone(self);
        thread::spawn(move || {
            while !stop.wait_timeout(interval) {
                queue.service_waiting_reader();
            }
        })
    }
}
