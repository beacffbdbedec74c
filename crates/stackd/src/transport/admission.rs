//! Data-plane connection handler: pool admission on the accept thread.

use std::net::TcpStream;
use std::sync::Arc;
use std::sync::mpsc::{SendError, Sender};

use tracing::{debug, info};

use crate::connection::Connection;
use crate::peer::Peer;
use crate::pool::{Admission, ConnectionPool};

use super::{ConnectionHandler, LISTENER_TARGET};

/// Wraps accepted streams, admits them into the pool and forwards admitted
/// connections to the dispatcher.
#[derive(Debug)]
pub(crate) struct AdmissionHandler {
    pool: Arc<ConnectionPool>,
    dispatch: Sender<Arc<Connection>>,
}

impl AdmissionHandler {
    pub(crate) const fn new(pool: Arc<ConnectionPool>, dispatch: Sender<Arc<Connection>>) -> Self {
        Self { pool, dispatch }
    }

    fn forward(&self, connection: Arc<Connection>) {
        if let Err(SendError(connection)) = self.dispatch.send(connection) {
            debug!(
                target: LISTENER_TARGET,
                slot = ?connection.slot_id(),
                "dispatcher gone; closing admitted connection"
            );
            connection.close();
            self.pool.release(&connection);
        }
    }
}

impl ConnectionHandler for AdmissionHandler {
    fn handle(&self, stream: TcpStream) {
        let connection = Arc::new(Connection::accept(stream));
        match self.pool.admit(&connection) {
            Admission::Accepted => self.forward(connection),
            Admission::Evicted(evicted) => {
                self.forward(connection);
                evicted.close();
            }
            Admission::Rejected => {
                info!(
                    target: LISTENER_TARGET,
                    peer = ?connection.peer_addr(),
                    "pool busy; connection refused"
                );
                connection.write_busy();
                connection.close();
            }
        }
    }
}
