//! Runtime for the `stackd` stack broker.
//!
//! Clients connect over TCP and send one request per connection: a header
//! byte whose top bit selects push or pop and whose low seven bits give the
//! payload length, followed by the payload for pushes. The broker keeps a
//! bounded LIFO stack in memory and answers with an acknowledgement byte or
//! a length-prefixed payload before closing the connection.
//!
//! The runtime is a set of cooperating threads around shared structures
//! that each own one lock:
//!
//! - the [`ConnectionPool`] admits, evicts and sweeps connections;
//! - the [`Store`] holds payloads and wakes parked producers synchronously
//!   on every pop;
//! - the [`QueueService`] routes read requests to the store and polls for
//!   consumers parked on an empty stack;
//! - one body reader per admitted connection reads the request under a
//!   deadline.
//!
//! A [`Server`] wires one instance of these together around a bound data
//! listener. [`run_daemon`] adds the control listener, signal handling and
//! restarts on request.

mod connection;
mod control;
mod health;
mod peer;
mod pool;
mod process;
mod queue;
mod server;
mod stop;
mod store;
mod telemetry;
mod transport;
pub mod wire;

pub use connection::Connection;
pub use control::{CONTROL_READ_WINDOW, ProcessEvent, RESTART_COMMAND};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use peer::Peer;
pub use pool::{Admission, ConnectionPool};
pub use process::{
    LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, TERMINATION_SIGNALS, run_daemon,
};
pub use queue::{QueueError, QueueService, RequestOutcome};
pub use server::{Server, ServerError, ServerSettings};
pub use stop::StopSignal;
pub use store::{Popped, PushOutcome, Store};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};
pub use transport::{ListenerError, ReaderSettings, SocketListener, TransportError};
pub use wire::{Action, Payload, ProtocolError};

#[cfg(test)]
mod test_support;
#[cfg(test)]
mod tests;
