//! Test helpers for the transport module.

use std::net::TcpStream;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use super::ConnectionHandler;

/// Counts accepted connections and keeps their streams open.
pub(crate) struct CountingHandler {
    count: Arc<AtomicUsize>,
    streams: Mutex<Vec<TcpStream>>,
}

impl CountingHandler {
    pub(crate) fn new() -> (Arc<AtomicUsize>, Arc<Self>) {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Self {
            count: Arc::clone(&count),
            streams: Mutex::new(Vec::new()),
        });
        (count, handler)
    }
}

impl ConnectionHandler for CountingHandler {
    fn handle(&self, stream: TcpStream) {
        self.streams
            .lock()
            .expect("stream list mutex poisoned")
            .push(stream);
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
