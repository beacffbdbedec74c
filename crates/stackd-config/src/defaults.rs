use std::num::NonZeroUsize;

use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// Host the listeners bind to when none is given.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default data-plane TCP port.
pub const DEFAULT_SERVICE_PORT: u16 = 8080;

/// Default control-plane TCP port.
pub const DEFAULT_CONTROL_PORT: u16 = 8081;

/// Default number of concurrently admitted connections.
pub const DEFAULT_CONN_POOL_SIZE: NonZeroUsize = NonZeroUsize::MIN.saturating_add(99);

/// Default stack capacity.
pub const DEFAULT_QUEUE_SIZE: usize = 100;

/// Age in seconds after which the oldest pooled connection may be evicted.
pub const DEFAULT_CONN_EXPIRATION_SECS: u64 = 10;

/// Pause inserted between body reader spawns.
pub const DEFAULT_DISPATCH_STAGGER_MS: u64 = 20;

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default data-plane endpoint.
#[must_use]
pub fn default_service_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp(DEFAULT_HOST, DEFAULT_SERVICE_PORT)
}

/// Default control-plane endpoint.
#[must_use]
pub fn default_control_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp(DEFAULT_HOST, DEFAULT_CONTROL_PORT)
}

/// Default log filter expression used by the daemon.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the daemon.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}
