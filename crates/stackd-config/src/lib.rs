//! Shared configuration for the stack broker daemon.
//!
//! Configuration is resolved once at startup with the precedence
//! command-line flag > environment variable > built-in default, and then
//! handed to the runtime as an immutable value. Nothing in the request path
//! reads ambient process state.

mod defaults;
mod logging;
mod socket;

use std::ffi::OsString;
use std::num::NonZeroUsize;
use std::time::Duration;

use clap::Parser;

pub use defaults::{
    DEFAULT_CONN_EXPIRATION_SECS, DEFAULT_CONN_POOL_SIZE, DEFAULT_CONTROL_PORT,
    DEFAULT_DISPATCH_STAGGER_MS, DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_QUEUE_SIZE,
    DEFAULT_SERVICE_PORT, default_control_endpoint, default_log_filter, default_log_format,
    default_service_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError};

/// Runtime configuration for `stackd`.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(
    name = "stackd",
    version,
    about = "Bounded LIFO stack broker over a compact binary TCP protocol"
)]
pub struct Config {
    /// Data-plane endpoint clients push to and pop from.
    #[arg(
        long = "service",
        env = "STACKD_SERVICE",
        value_name = "ENDPOINT",
        default_value_t = default_service_endpoint()
    )]
    pub service: SocketEndpoint,

    /// Control-plane endpoint accepting restart requests.
    #[arg(
        long = "control",
        env = "STACKD_CONTROL",
        value_name = "ENDPOINT",
        default_value_t = default_control_endpoint()
    )]
    pub control: SocketEndpoint,

    /// Maximum number of concurrently admitted connections.
    #[arg(long, env = "CONN_POOL_SIZE", default_value_t = DEFAULT_CONN_POOL_SIZE)]
    pub conn_pool_size: NonZeroUsize,

    /// Maximum number of payloads held by the stack.
    #[arg(long, env = "QUEUE_SIZE", default_value_t = DEFAULT_QUEUE_SIZE)]
    pub queue_size: usize,

    /// Age in seconds after which the oldest admitted connection may be
    /// evicted to make room for a new one.
    #[arg(
        long,
        env = "CONN_EXPIRATION_SECS",
        default_value_t = DEFAULT_CONN_EXPIRATION_SECS
    )]
    pub conn_expiration_secs: u64,

    /// Pause between body reader spawns, in milliseconds. `0` disables it.
    #[arg(
        long,
        env = "DISPATCH_STAGGER_MS",
        default_value_t = DEFAULT_DISPATCH_STAGGER_MS
    )]
    pub dispatch_stagger_ms: u64,

    /// Tracing filter expression, for example `info` or `stackd=debug`.
    #[arg(long, env = "LOG_LEVEL", default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns the `clap` error describing the first invalid flag or
    /// environment value.
    pub fn load() -> Result<Self, clap::Error> {
        Self::try_parse()
    }

    /// Loads configuration from an explicit argument vector. The first item
    /// is the program name.
    ///
    /// # Errors
    ///
    /// Returns the `clap` error describing the first invalid flag or
    /// environment value.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args)
    }

    /// Data-plane endpoint.
    #[must_use]
    pub const fn service_endpoint(&self) -> &SocketEndpoint {
        &self.service
    }

    /// Control-plane endpoint.
    #[must_use]
    pub const fn control_endpoint(&self) -> &SocketEndpoint {
        &self.control
    }

    /// Maximum number of concurrently admitted connections.
    #[must_use]
    pub const fn max_connections(&self) -> NonZeroUsize {
        self.conn_pool_size
    }

    /// Stack capacity.
    #[must_use]
    pub const fn stack_length(&self) -> usize {
        self.queue_size
    }

    /// Pool expiration threshold.
    #[must_use]
    pub const fn conn_expiration(&self) -> Duration {
        Duration::from_secs(self.conn_expiration_secs)
    }

    /// Pause between body reader spawns.
    #[must_use]
    pub const fn dispatch_stagger(&self) -> Duration {
        Duration::from_millis(self.dispatch_stagger_ms)
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: default_service_endpoint(),
            control: default_control_endpoint(),
            conn_pool_size: DEFAULT_CONN_POOL_SIZE,
            queue_size: DEFAULT_QUEUE_SIZE,
            conn_expiration_secs: DEFAULT_CONN_EXPIRATION_SECS,
            dispatch_stagger_ms: DEFAULT_DISPATCH_STAGGER_MS,
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: default_log_format(),
        }
    }
}
