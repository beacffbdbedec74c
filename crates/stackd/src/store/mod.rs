//! Bounded LIFO store shared by every connection.
//!
//! The store also owns the queue of producers parked on a full stack. A
//! successful [`Store::pop`] refills the freed slot from the oldest parked
//! producer while still holding the store lock and acknowledges that
//! producer once the lock is released, so producers unblock without any
//! polling delay.

#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::peer::Peer;
use crate::wire::Payload;

const STORE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::store");

/// Outcome of [`Store::push_or_wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The payload was stored.
    Accepted,
    /// The stack was full; the writer was parked.
    Waiting,
    /// The stack was full and the parked-writer queue was at capacity.
    Overflow,
}

/// Result of [`Store::pop_refilling`].
#[derive(Debug)]
pub struct Popped<P> {
    /// The payload taken from the top of the stack.
    pub payload: Payload,
    /// The parked writer whose payload took the freed slot. Its push has
    /// already been acknowledged.
    pub refilled_by: Option<Arc<P>>,
}

#[derive(Debug)]
struct StoreState<P> {
    items: Vec<Payload>,
    waiting_writers: VecDeque<Arc<P>>,
}

/// Bounded LIFO stack of payloads plus its parked producers.
#[derive(Debug)]
pub struct Store<P> {
    capacity: usize,
    max_waiting_writers: usize,
    state: Mutex<StoreState<P>>,
}

impl<P: Peer> Store<P> {
    /// Builds an empty store holding at most `capacity` payloads and parking
    /// at most `max_waiting_writers` producers.
    #[must_use]
    pub fn new(capacity: usize, max_waiting_writers: usize) -> Self {
        Self {
            capacity,
            max_waiting_writers,
            state: Mutex::new(StoreState {
                items: Vec::with_capacity(capacity),
                waiting_writers: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Maximum number of parked writers.
    #[must_use]
    pub const fn max_waiting_writers(&self) -> usize {
        self.max_waiting_writers
    }

    /// Appends `payload` if there is room. Returns `false`, leaving the
    /// stack untouched, when it is full.
    pub fn push(&self, payload: Payload) -> bool {
        let mut state = self.lock();
        self.try_append(&mut state, payload)
    }

    /// Pushes the writer's payload, or parks the writer when the stack is
    /// full. Both happen under one lock acquisition so a concurrent pop
    /// cannot slip between the capacity check and the parking.
    pub fn push_or_wait(&self, writer: &Arc<P>) -> PushOutcome {
        let mut state = self.lock();
        if self.try_append(&mut state, writer.payload()) {
            return PushOutcome::Accepted;
        }
        if state.waiting_writers.len() >= self.max_waiting_writers {
            return PushOutcome::Overflow;
        }
        state.waiting_writers.push_back(Arc::clone(writer));
        info!(
            target: STORE_TARGET,
            slot = ?writer.slot_id(),
            waiting = state.waiting_writers.len(),
            "stack full; writer parked"
        );
        PushOutcome::Waiting
    }

    fn try_append(&self, state: &mut StoreState<P>, payload: Payload) -> bool {
        if state.items.len() >= self.capacity {
            debug!(target: STORE_TARGET, len = state.items.len(), "stack full");
            return false;
        }
        state.items.push(payload);
        debug!(target: STORE_TARGET, len = state.items.len(), "payload pushed");
        true
    }

    /// Removes and returns the top payload.
    ///
    /// See [`Store::pop_refilling`] for how parked writers are serviced.
    pub fn pop(&self) -> Option<Payload> {
        self.pop_refilling().map(|popped| popped.payload)
    }

    /// Removes the top payload and lets the oldest parked writer take the
    /// freed slot.
    ///
    /// The writer is dequeued and its payload stored under the same lock;
    /// its acknowledgement is written after the lock is released. A dead
    /// writer's payload is discarded and the slot stays free. At most one
    /// writer is serviced per pop.
    pub fn pop_refilling(&self) -> Option<Popped<P>> {
        let (payload, refilled_by) = {
            let mut state = self.lock();
            let top = state.items.pop()?;
            let refilled_by = match state.waiting_writers.pop_front() {
                Some(writer) if writer.probe_liveness() => {
                    state.items.push(writer.payload());
                    Some(writer)
                }
                Some(writer) => {
                    info!(
                        target: STORE_TARGET,
                        slot = ?writer.slot_id(),
                        "parked writer disconnected; push dropped"
                    );
                    None
                }
                None => None,
            };
            (top, refilled_by)
        };
        if let Some(writer) = &refilled_by {
            writer.write_push_ack();
            info!(
                target: STORE_TARGET,
                slot = ?writer.slot_id(),
                "parked writer refilled freed slot"
            );
        }
        Some(Popped {
            payload,
            refilled_by,
        })
    }

    /// Number of stored payloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Whether the stack holds no payloads.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Whether the stack is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.lock().items.len() >= self.capacity
    }

    /// Number of parked writers.
    #[must_use]
    pub fn waiting_writers(&self) -> usize {
        self.lock().waiting_writers.len()
    }
}
