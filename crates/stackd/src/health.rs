//! Structured health reporting for broker lifecycle events.

use std::net::SocketAddr;
use std::sync::Arc;

use stackd_config::SocketEndpoint;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before the data listener is bound.
    fn server_starting(&self, endpoint: &SocketEndpoint);

    /// Invoked once the data-plane server accepts connections.
    fn server_ready(&self, addr: SocketAddr);

    /// Invoked once the control listener accepts connections.
    fn control_ready(&self, addr: SocketAddr);

    /// Invoked when a control client asks for a restart.
    fn restart_requested(&self);

    /// Invoked before the data-plane server is drained.
    fn server_stopping(&self);

    /// Invoked after the data-plane server has been drained.
    fn server_stopped(&self);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn server_starting(&self, endpoint: &SocketEndpoint) {
        (**self).server_starting(endpoint);
    }

    fn server_ready(&self, addr: SocketAddr) {
        (**self).server_ready(addr);
    }

    fn control_ready(&self, addr: SocketAddr) {
        (**self).control_ready(addr);
    }

    fn restart_requested(&self) {
        (**self).restart_requested();
    }

    fn server_stopping(&self) {
        (**self).server_stopping();
    }

    fn server_stopped(&self) {
        (**self).server_stopped();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn server_starting(&self, endpoint: &SocketEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_starting",
            endpoint = %endpoint,
            "starting stack server"
        );
    }

    fn server_ready(&self, addr: SocketAddr) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_ready",
            addr = %addr,
            "stack server ready"
        );
    }

    fn control_ready(&self, addr: SocketAddr) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "control_ready",
            addr = %addr,
            "control listener ready"
        );
    }

    fn restart_requested(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "restart_requested",
            "restart requested over the control socket"
        );
    }

    fn server_stopping(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_stopping",
            "draining stack server"
        );
    }

    fn server_stopped(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_stopped",
            "stack server stopped"
        );
    }
}
