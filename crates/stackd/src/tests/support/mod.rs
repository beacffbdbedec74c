//! Test harness utilities for the broker behavioural suites.

pub mod client;
mod reporter;
mod shutdown;

pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use shutdown::TestShutdownSignal;
