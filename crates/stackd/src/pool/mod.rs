//! Bounded registry of admitted connections.
//!
//! Admission never blocks: a new connection is accepted while there is room,
//! takes the place of the oldest entry once that entry has outlived the
//! expiration threshold, and is rejected otherwise. A background sweep
//! drops entries whose peer has gone away.
//!
//! Lock order is pool first, connection second. Nothing that holds a
//! connection lock calls back into the pool.


use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::connection::{Connection, epoch_seconds};
use crate::peer::Peer;
use crate::stop::StopSignal;

const POOL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::pool");

/// Result of [`ConnectionPool::admit`].
#[derive(Debug)]
pub enum Admission {
    /// The connection took a free slot.
    Accepted,
    /// The connection replaced an expired entry. The caller closes the
    /// evicted connection once the new one is on its way to a reader.
    Evicted(Arc<Connection>),
    /// The pool is full and nothing has expired. The caller answers busy and
    /// closes the new connection.
    Rejected,
}

/// Registry of admitted connections, oldest first.
#[derive(Debug)]
pub struct ConnectionPool {
    capacity: NonZeroUsize,
    expiration: Duration,
    entries: Mutex<Vec<Arc<Connection>>>,
}

impl ConnectionPool {
    /// Builds an empty pool.
    #[must_use]
    pub fn new(capacity: NonZeroUsize, expiration: Duration) -> Self {
        Self {
            capacity,
            expiration,
            entries: Mutex::new(Vec::with_capacity(capacity.get())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Connection>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Maximum number of admitted connections.
    #[must_use]
    pub const fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    /// Tries to admit `connection`, assigning it a slot id on success.
    pub fn admit(&self, connection: &Arc<Connection>) -> Admission {
        self.admit_at(connection, epoch_seconds())
    }

    pub(crate) fn admit_at(&self, connection: &Arc<Connection>, now: u64) -> Admission {
        let mut entries = self.lock();
        if entries.len() < self.capacity.get() {
            let slot = lowest_free_slot(&entries);
            connection.set_slot_id(slot);
            entries.push(Arc::clone(connection));
            debug!(target: POOL_TARGET, slot, len = entries.len(), "connection admitted");
            return Admission::Accepted;
        }

        let Some(oldest) = entries.first() else {
            return Admission::Rejected;
        };
        let age = oldest.age_at(now);
        if age < self.expiration {
            info!(
                target: POOL_TARGET,
                oldest_age_secs = age.as_secs(),
                capacity = self.capacity.get(),
                "pool full; connection rejected"
            );
            return Admission::Rejected;
        }

        let evicted = entries.remove(0);
        let slot = evicted
            .slot_id()
            .unwrap_or_else(|| lowest_free_slot(&entries));
        connection.set_slot_id(slot);
        entries.push(Arc::clone(connection));
        info!(
            target: POOL_TARGET,
            slot,
            evicted_age_secs = age.as_secs(),
            "expired connection evicted"
        );
        Admission::Evicted(evicted)
    }

    /// Removes `connection` from the registry, keeping the order of the
    /// remaining entries. Returns `false` when it was already gone.
    pub fn release(&self, connection: &Connection) -> bool {
        let mut entries = self.lock();
        let Some(index) = entries
            .iter()
            .position(|entry| std::ptr::eq(Arc::as_ptr(entry), connection))
        else {
            return false;
        };
        entries.remove(index);
        debug!(
            target: POOL_TARGET,
            slot = ?connection.slot_id(),
            len = entries.len(),
            "connection released"
        );
        true
    }

    /// Probes every entry and closes the ones whose peer has gone away.
    /// Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let mut dead = Vec::new();
        {
            let mut entries = self.lock();
            entries.retain(|entry| {
                if entry.probe_liveness() {
                    true
                } else {
                    dead.push(Arc::clone(entry));
                    false
                }
            });
        }
        for connection in &dead {
            connection.close();
        }
        if !dead.is_empty() {
            debug!(target: POOL_TARGET, removed = dead.len(), "sweep removed dead connections");
        }
        dead.len()
    }

    /// Closes every registered connection and empties the registry.
    pub fn close_all(&self) {
        let drained = std::mem::take(&mut *self.lock());
        for connection in &drained {
            connection.close();
        }
        info!(target: POOL_TARGET, closed = drained.len(), "connection pool drained");
    }

    /// Starts the periodic sweep. On `stop` the thread drains the pool and
    /// exits.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        stop: StopSignal,
    ) -> thread::JoinHandle<()> {
        let pool = Arc::clone(self);
        thread::spawn(move || {
            while !stop.wait_timeout(interval) {
                pool.sweep();
            }
            pool.close_all();
        })
    }

    /// Number of admitted connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no connection is admitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Slot ids currently in use, in registry order.
    #[must_use]
    pub fn slots(&self) -> Vec<Option<usize>> {
        self.lock().iter().map(|entry| entry.slot_id()).collect()
    }
}

fn lowest_free_slot(entries: &[Arc<Connection>]) -> usize {
    let mut used: Vec<usize> = entries.iter().filter_map(|entry| entry.slot_id()).collect();
    used.sort_unstable();
    used.iter()
        .enumerate()
        .find(|(index, slot)| index != *slot)
        .map_or(used.len(), |(index, _)| index)
}
