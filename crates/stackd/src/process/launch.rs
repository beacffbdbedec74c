//! Supervises broker launch, restarts and shutdown.

use std::sync::Arc;
use std::sync::mpsc;

use tracing::info;

use stackd_config::Config;

use crate::control::{ControlHandler, ProcessEvent};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::server::{Server, ServerSettings};
use crate::telemetry;
use crate::transport::SocketListener;

use super::errors::LaunchError;
use super::PROCESS_TARGET;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal, spawn_shutdown_watcher};

/// Collaborators required to run the broker.
pub(crate) struct LaunchPlan<S> {
    pub(crate) config: Config,
    pub(crate) shutdown: S,
    pub(crate) reporter: Arc<dyn HealthReporter>,
}

/// Runs the broker with the production collaborators until a termination
/// signal arrives.
///
/// # Errors
///
/// Returns [`LaunchError`] when telemetry cannot be installed, when either
/// listener cannot be bound, or when a server fails to stop cleanly.
pub fn run_daemon(config: Config) -> Result<(), LaunchError> {
    telemetry::initialise(&config)?;
    let plan = LaunchPlan {
        config,
        shutdown: SystemShutdownSignal::new(),
        reporter: Arc::new(StructuredHealthReporter::new()),
    };
    run_daemon_with(plan)
}

/// Runs the broker with injected collaborators.
///
/// Both listeners are bound before anything is started, so a bad endpoint
/// fails the launch without side effects. Restart requests from the control
/// listener stop the running server and start a fresh one on a newly bound
/// data listener.
pub(crate) fn run_daemon_with<S>(plan: LaunchPlan<S>) -> Result<(), LaunchError>
where
    S: ShutdownSignal + 'static,
{
    let LaunchPlan {
        config,
        shutdown,
        reporter,
    } = plan;
    info!(
        target: PROCESS_TARGET,
        service = %config.service_endpoint(),
        control = %config.control_endpoint(),
        "starting broker runtime"
    );

    let control = SocketListener::bind(config.control_endpoint())?;
    let control_addr = control.local_addr();
    let mut server = start_server(&config, &reporter)?;

    let (events, inbox) = mpsc::channel();
    let control_handle = control.start(Arc::new(ControlHandler::new(events.clone())))?;
    if let Some(addr) = control_addr {
        reporter.control_ready(addr);
    }
    let watcher = spawn_shutdown_watcher(shutdown, events);

    while let Ok(event) = inbox.recv() {
        match event {
            ProcessEvent::Restart => {
                reporter.restart_requested();
                server.stop()?;
                server = start_server(&config, &reporter)?;
                info!(target: PROCESS_TARGET, addr = ?server.local_addr(), "server restarted");
            }
            ProcessEvent::Shutdown => break,
        }
    }

    server.stop()?;
    control_handle.shutdown();
    control_handle.join()?;
    watcher
        .join()
        .map_err(|_| LaunchError::WorkerPanic {
            worker: "shutdown watcher",
        })??;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}

fn start_server(config: &Config, reporter: &Arc<dyn HealthReporter>) -> Result<Server, LaunchError> {
    reporter.server_starting(config.service_endpoint());
    let listener = SocketListener::bind(config.service_endpoint())?;
    let server = Server::start(
        listener,
        ServerSettings::from_config(config),
        Arc::clone(reporter),
    )?;
    Ok(server)
}
