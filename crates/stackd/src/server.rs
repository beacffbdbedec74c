//! One data-plane server instance: pool, store, readers and listener.
//!
//! A restart stops the running instance and starts a new one, so each
//! instance owns fresh state and its own stop signal.

use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use stackd_config::Config;

use crate::connection::Connection;
use crate::health::HealthReporter;
use crate::pool::ConnectionPool;
use crate::queue::QueueService;
use crate::stop::StopSignal;
use crate::transport::{
    AdmissionHandler, ListenerError, ListenerHandle, ReaderSettings, RequestPipeline,
    SocketListener,
};

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// Interval of the pool liveness sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_millis(500);
/// Interval of the parked-reader wake-up poll.
pub const READER_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Overall deadline for reading one request.
pub const READ_DEADLINE: Duration = Duration::from_secs(20);
/// Time allowed for in-flight body readers to finish on stop.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

const GRACE_POLL: Duration = Duration::from_millis(10);

/// Settings for one server instance, derived once from [`Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    /// Pool capacity.
    pub max_connections: NonZeroUsize,
    /// Store capacity.
    pub stack_length: usize,
    /// Age after which the oldest pooled connection may be evicted.
    pub conn_expiration: Duration,
    /// Interval of the pool sweep.
    pub sweep_interval: Duration,
    /// Interval of the parked-reader poll.
    pub reader_poll_interval: Duration,
    /// Body reader timing.
    pub reader: ReaderSettings,
    /// Time allowed for in-flight readers on stop.
    pub shutdown_grace: Duration,
}

impl ServerSettings {
    /// Translates the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_connections: config.max_connections(),
            stack_length: config.stack_length(),
            conn_expiration: config.conn_expiration(),
            sweep_interval: SWEEP_INTERVAL,
            reader_poll_interval: READER_POLL_INTERVAL,
            reader: ReaderSettings {
                read_deadline: READ_DEADLINE,
                dispatch_stagger: config.dispatch_stagger(),
            },
            shutdown_grace: SHUTDOWN_GRACE,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Errors raised while stopping a server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The accept loop failed.
    #[error(transparent)]
    Listener(#[from] ListenerError),
    /// A background worker panicked.
    #[error("{worker} thread panicked")]
    WorkerPanic {
        /// Name of the worker.
        worker: &'static str,
    },
}

/// A running data-plane server.
pub struct Server {
    local_addr: Option<SocketAddr>,
    stop: StopSignal,
    listener: Option<ListenerHandle>,
    workers: Vec<(&'static str, thread::JoinHandle<()>)>,
    pool: Arc<ConnectionPool>,
    queue: Arc<QueueService<Connection>>,
    pipeline: Arc<RequestPipeline>,
    shutdown_grace: Duration,
    reporter: Arc<dyn HealthReporter>,
}

impl Server {
    /// Starts the background tasks and the accept loop around `listener`.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] when the accept loop cannot start.
    pub fn start(
        listener: SocketListener,
        settings: ServerSettings,
        reporter: Arc<dyn HealthReporter>,
    ) -> Result<Self, ListenerError> {
        let stop = StopSignal::new();
        let pool = Arc::new(ConnectionPool::new(
            settings.max_connections,
            settings.conn_expiration,
        ));
        let released = Arc::clone(&pool);
        let queue = Arc::new(
            QueueService::new(settings.stack_length, settings.max_connections.get())
                .with_release(move |connection: &Connection| {
                    released.release(connection);
                }),
        );
        let pipeline = Arc::new(RequestPipeline::new(
            Arc::clone(&pool),
            Arc::clone(&queue),
            settings.reader,
            stop.clone(),
        ));

        let (dispatch, inbox) = mpsc::channel();
        let workers = vec![
            ("dispatcher", pipeline.spawn_dispatcher(inbox)),
            (
                "pool sweep",
                pool.spawn_sweeper(settings.sweep_interval, stop.clone()),
            ),
            (
                "reader poll",
                queue.spawn_reader_poller(settings.reader_poll_interval, stop.clone()),
            ),
        ];

        let local_addr = listener.local_addr();
        let handler = Arc::new(AdmissionHandler::new(Arc::clone(&pool), dispatch));
        let listener = match listener.start(handler) {
            Ok(handle) => handle,
            Err(error) => {
                stop.cancel();
                for (_, worker) in workers {
                    let _ = worker.join();
                }
                return Err(error);
            }
        };

        if let Some(addr) = local_addr {
            reporter.server_ready(addr);
        }
        info!(
            target: SERVER_TARGET,
            addr = ?local_addr,
            max_connections = settings.max_connections.get(),
            stack_length = settings.stack_length,
            "stack server started"
        );
        Ok(Self {
            local_addr,
            stop,
            listener: Some(listener),
            workers,
            pool,
            queue,
            pipeline,
            shutdown_grace: settings.shutdown_grace,
            reporter,
        })
    }

    /// Address the data listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Connection pool of this instance.
    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Orchestrator of this instance.
    #[must_use]
    pub fn queue(&self) -> &QueueService<Connection> {
        &self.queue
    }

    /// Stops accepting, drains the pool and waits for the workers.
    ///
    /// In-flight body readers get up to the shutdown grace to notice the
    /// stop signal before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the accept loop or a worker panicked.
    pub fn stop(mut self) -> Result<(), ServerError> {
        self.reporter.server_stopping();
        self.stop.cancel();
        let mut result = Ok(());
        if let Some(listener) = self.listener.take() {
            listener.shutdown();
            result = listener.join().map_err(ServerError::from);
        }
        for (worker, handle) in self.workers.drain(..) {
            if handle.join().is_err() && result.is_ok() {
                result = Err(ServerError::WorkerPanic { worker });
            }
        }
        self.wait_for_readers();
        self.reporter.server_stopped();
        result
    }

    fn wait_for_readers(&self) {
        let deadline = Instant::now() + self.shutdown_grace;
        while self.pipeline.in_flight() > 0 {
            if Instant::now() >= deadline {
                warn!(
                    target: SERVER_TARGET,
                    in_flight = self.pipeline.in_flight(),
                    "body readers still running after shutdown grace"
                );
                return;
            }
            thread::sleep(GRACE_POLL);
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
