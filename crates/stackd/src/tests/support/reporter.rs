//! Test double for [`HealthReporter`] that records lifecycle events.

use std::net::SocketAddr;
use std::sync::Mutex;

use stackd_config::SocketEndpoint;

use crate::health::HealthReporter;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// A server is about to bind the endpoint.
    ServerStarting(String),
    /// A server accepts connections on the address.
    ServerReady(SocketAddr),
    /// The control listener accepts connections on the address.
    ControlReady(SocketAddr),
    /// A restart was requested.
    RestartRequested,
    /// A server is draining.
    ServerStopping,
    /// A server finished draining.
    ServerStopped,
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    pub fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }

    /// Address reported by the most recent `server_ready` event.
    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.events().into_iter().rev().find_map(|event| match event {
            HealthEvent::ServerReady(addr) => Some(addr),
            _ => None,
        })
    }

    /// Address reported by the `control_ready` event.
    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.events().into_iter().find_map(|event| match event {
            HealthEvent::ControlReady(addr) => Some(addr),
            _ => None,
        })
    }

    /// Number of recorded events equal to `expected`.
    pub fn count(&self, expected: &HealthEvent) -> usize {
        self.events()
            .iter()
            .filter(|event| *event == expected)
            .count()
    }

    /// Number of `server_ready` events.
    pub fn ready_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, HealthEvent::ServerReady(_)))
            .count()
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn server_starting(&self, endpoint: &SocketEndpoint) {
        self.record(HealthEvent::ServerStarting(endpoint.to_string()));
    }

    fn server_ready(&self, addr: SocketAddr) {
        self.record(HealthEvent::ServerReady(addr));
    }

    fn control_ready(&self, addr: SocketAddr) {
        self.record(HealthEvent::ControlReady(addr));
    }

    fn restart_requested(&self) {
        self.record(HealthEvent::RestartRequested);
    }

    fn server_stopping(&self) {
        self.record(HealthEvent::ServerStopping);
    }

    fn server_stopped(&self) {
        self.record(HealthEvent::ServerStopped);
    }
}
