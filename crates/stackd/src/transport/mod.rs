//! Socket listeners and the data-plane request pipeline.
//!
//! Listeners accept connections on a background thread and hand each stream
//! to a [`ConnectionHandler`]. The data-plane handler admits connections into
//! the pool and queues them for the body readers.

mod admission;
mod errors;
mod handler;
mod listener;
mod reader;
#[cfg(test)]
mod test_utils;

pub(crate) use self::admission::AdmissionHandler;
pub use self::errors::{ListenerError, TransportError};
pub(crate) use self::handler::ConnectionHandler;
pub(crate) use self::listener::ListenerHandle;
pub use self::listener::SocketListener;
pub use self::reader::ReaderSettings;
pub(crate) use self::reader::RequestPipeline;
#[cfg(test)]
pub(crate) use self::test_utils::CountingHandler;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
