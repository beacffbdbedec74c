//! Termination handling for the broker process.
//!
//! A watcher thread blocks on a [`ShutdownSignal`] and turns its outcome
//! into [`ProcessEvent::Shutdown`] on the supervisor's event channel, the
//! same channel the control listener uses for restarts. The event is sent
//! even when the signal source fails, so the supervisor always drains the
//! running server before exiting.

use std::io;
use std::sync::mpsc::Sender;
use std::thread;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::{info, warn};

use crate::control::ProcessEvent;

use super::PROCESS_TARGET;

/// Signals that stop the broker.
pub const TERMINATION_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Source of the request to stop the broker.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until the broker should stop.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError`] when the notification source cannot be set
    /// up.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Errors reported by shutdown signal sources.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Registering the termination signal handlers failed.
    #[error("failed to register termination signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Waits for one of [`TERMINATION_SIGNALS`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemShutdownSignal;

impl SystemShutdownSignal {
    /// Builds the process signal source.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let mut signals =
            Signals::new(TERMINATION_SIGNALS).map_err(|source| ShutdownError::Install { source })?;
        if let Some(signal) = signals.forever().next() {
            info!(target: PROCESS_TARGET, signal, "termination signal received; draining broker");
        }
        Ok(())
    }
}

/// Forwards the outcome of `shutdown` to the supervisor as
/// [`ProcessEvent::Shutdown`]. The join handle yields the signal source's
/// result.
pub(crate) fn spawn_shutdown_watcher<S>(
    shutdown: S,
    events: Sender<ProcessEvent>,
) -> thread::JoinHandle<Result<(), ShutdownError>>
where
    S: ShutdownSignal + 'static,
{
    thread::spawn(move || {
        let result = shutdown.wait();
        if let Err(error) = &result {
            warn!(target: PROCESS_TARGET, error = %error, "shutdown signal source failed");
        }
        if events.send(ProcessEvent::Shutdown).is_err() {
            warn!(target: PROCESS_TARGET, "supervisor gone before shutdown");
        }
        result
    })
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use rstest::rstest;

    use super::*;
    use crate::tests::support::TestShutdownSignal;

    struct UnavailableSignal;

    impl ShutdownSignal for UnavailableSignal {
        fn wait(&self) -> Result<(), ShutdownError> {
            Err(ShutdownError::Install {
                source: io::Error::other("signals unavailable"),
            })
        }
    }

    #[rstest]
    fn watcher_waits_for_the_signal_before_forwarding() {
        let signal = TestShutdownSignal::new();
        let (events, inbox) = mpsc::channel();
        let watcher = spawn_shutdown_watcher(signal.clone(), events);

        assert!(inbox.recv_timeout(Duration::from_millis(50)).is_err());
        signal.trigger();

        assert_eq!(
            inbox.recv_timeout(Duration::from_secs(3)),
            Ok(ProcessEvent::Shutdown)
        );
        assert!(watcher.join().expect("join watcher").is_ok());
    }

    #[rstest]
    fn failed_signal_source_still_stops_the_supervisor() {
        let (events, inbox) = mpsc::channel();
        let watcher = spawn_shutdown_watcher(UnavailableSignal, events);

        assert_eq!(
            inbox.recv_timeout(Duration::from_secs(3)),
            Ok(ProcessEvent::Shutdown)
        );
        assert!(matches!(
            watcher.join().expect("join watcher"),
            Err(ShutdownError::Install { .. })
        ));
    }

    #[rstest]
    fn watcher_tolerates_a_departed_supervisor() {
        let signal = TestShutdownSignal::new();
        let (events, inbox) = mpsc::channel();
        drop(inbox);
        signal.trigger();

        let watcher = spawn_shutdown_watcher(signal, events);

        assert!(watcher.join().expect("join watcher").is_ok());
    }
}
