//! Capability set the store and orchestrator need from a client connection.

use crate::wire::{Action, Payload};

/// Response-writing and liveness capabilities of a client connection.
///
/// The store and the request orchestrator only ever talk to clients through
/// this trait, which keeps them independent of the socket-backed
/// [`Connection`](crate::Connection) and lets tests substitute fakes.
#[cfg_attr(test, mockall::automock)]
pub trait Peer: Send + Sync {
    /// Pool slot assigned at admission, if any.
    fn slot_id(&self) -> Option<usize>;

    /// Action decoded from the request header, if reading completed.
    fn action(&self) -> Option<Action>;

    /// Payload read from the request body.
    fn payload(&self) -> Payload;

    /// Overrides the liveness flag.
    fn set_alive(&self, alive: bool);

    /// Returns the liveness flag without touching the socket.
    fn is_alive(&self) -> bool;

    /// Checks whether the remote end is still connected without consuming
    /// any unread bytes. A negative result also clears the liveness flag.
    fn probe_liveness(&self) -> bool;

    /// Acknowledges a push and closes the connection.
    fn write_push_ack(&self);

    /// Sends a framed pop response and closes the connection.
    fn write_pop_response(&self, payload: &Payload);

    /// Signals that the pool is busy. The connection stays open.
    fn write_busy(&self);

    /// Terminates the connection after a failed request.
    fn write_error(&self);
}
