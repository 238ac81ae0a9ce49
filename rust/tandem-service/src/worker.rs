//! A start/stop lifecycle whose actions run on one dedicated thread.
//!
//! [`WorkerService`] is the right shape for activities that must live on a
//! background thread of their own - a socket reader, a device poller - but
//! whose owners want plain, synchronous `start()`/`stop()` calls. The
//! service lazily creates a dedicated thread on first start and keeps it
//! parked on a command channel for the rest of the service's life.
//!
//! `start` and `stop` are synchronous from the caller's perspective even
//! though the actual work happens on the dedicated thread: each call hands
//! its action over and blocks on a rendezvous until the thread has fully
//! executed it. By the time either call returns, [`thread`](WorkerService::thread)
//! and the owned resource are settled - no partial state is ever observable.
//!
//! The start action may produce a resource (for example, the stream it
//! opened); the service owns it until the matching stop action receives it
//! back. Start/stop actions must not block: the calling thread is waiting
//! on them, so a blocking action stalls `start`/`stop` indefinitely. That
//! is a caller obligation, not something this type can enforce.
//!
//! Unlike [`Service`](crate::service::Service), which rejects an ambiguous
//! strategy, a configured handler here silently takes priority over
//! closures. The handler is held weakly; if it has been dropped by call
//! time the closures (when present) are used instead.

use std::{
    sync::{Arc, Mutex, Weak, mpsc},
    thread,
};

use crate::error::{Result, ServiceError};

/// The delegate flavor of a [`WorkerService`] strategy.
///
/// Both methods run on the service's dedicated thread and must not block.
pub trait WorkerHandler<R>: Send + Sync {
    /// Begin the activity, optionally returning a resource the service
    /// will own until the matching stop.
    fn start_worker(&self) -> Option<R>;

    /// End the activity. Receives the resource produced by the start, if
    /// any; the resource is dropped after this returns.
    fn stop_worker(&self, resource: Option<R>);
}

type StartAction<R> = Arc<dyn Fn() -> Option<R> + Send + Sync>;
type StopAction<R> = Arc<dyn Fn(Option<R>) + Send + Sync>;

/// A start/stop service owning a dedicated worker thread.
///
/// All methods take `&self`; share the service between threads with an
/// `Arc`. Dropping the last reference closes the command channel and lets
/// the dedicated thread exit.
pub struct WorkerService<R> {
    config: Mutex<WorkerConfig<R>>,
    resource: Arc<Mutex<Option<R>>>,
    control: Mutex<Control<R>>,
}

impl<R: Send + 'static> WorkerService<R> {
    /// Creates an unconfigured worker service. A strategy must be set
    /// before the first `start`.
    pub fn new() -> WorkerService<R> {
        WorkerService {
            config: Mutex::new(WorkerConfig {
                handler: None,
                closures: None,
            }),
            resource: Arc::new(Mutex::new(None)),
            control: Mutex::new(Control {
                running: false,
                start_count: 0,
                commands: None,
                thread: None,
            }),
        }
    }

    /// Creates a worker service driven by `handler`.
    pub fn with_handler<H>(handler: &Arc<H>) -> WorkerService<R>
    where
        H: WorkerHandler<R> + 'static,
    {
        let service = WorkerService::new();
        service.set_handler(handler);
        service
    }

    /// Creates a worker service driven by a start/stop closure pair.
    pub fn with_closures<S, P>(start: S, stop: P) -> WorkerService<R>
    where
        S: Fn() -> Option<R> + Send + Sync + 'static,
        P: Fn(Option<R>) + Send + Sync + 'static,
    {
        let service = WorkerService::new();
        service.set_closures(start, stop);
        service
    }

    /// Configures the handler strategy. The handler is held weakly and
    /// takes priority over closures when both are configured.
    pub fn set_handler<H>(&self, handler: &Arc<H>)
    where
        H: WorkerHandler<R> + 'static,
    {
        let handler: Arc<dyn WorkerHandler<R>> = handler.clone();
        let weak: Weak<dyn WorkerHandler<R>> = Arc::downgrade(&handler);
        self.config.lock().unwrap().handler = Some(weak);
    }

    /// Configures the closure strategy.
    pub fn set_closures<S, P>(&self, start: S, stop: P)
    where
        S: Fn() -> Option<R> + Send + Sync + 'static,
        P: Fn(Option<R>) + Send + Sync + 'static,
    {
        let mut config = self.config.lock().unwrap();
        config.closures = Some((Arc::new(start), Arc::new(stop)));
    }

    /// Starts the service.
    ///
    /// Returns `Ok(false)` if already running. Otherwise validates the
    /// strategy (before any thread is spawned), runs the start action on
    /// the dedicated thread, blocks until it has completed there, publishes
    /// the resource it produced, and returns `Ok(true)`.
    pub fn start(&self) -> Result<bool> {
        let mut control = self.control.lock().unwrap();
        if control.running {
            return Ok(false);
        }
        let action = self.resolve()?;
        let commands = self.ensure_thread(&mut control);

        let (ack_tx, ack_rx) = mpsc::sync_channel(0);
        commands
            .send(Command::Start(action, ack_tx))
            .expect("worker thread is alive");
        ack_rx.recv().expect("worker thread acknowledges start");

        control.running = true;
        control.start_count += 1;
        Ok(true)
    }

    /// Stops the service.
    ///
    /// Returns `Ok(false)` if not running. Otherwise runs the stop action
    /// on the dedicated thread - handing it the owned resource - blocks
    /// until it has completed there, and returns `Ok(true)` with the
    /// resource cleared.
    pub fn stop(&self) -> Result<bool> {
        let mut control = self.control.lock().unwrap();
        if !control.running {
            return Ok(false);
        }
        let action = self.resolve()?;
        let commands = control
            .commands
            .clone()
            .expect("running service has a worker thread");

        let (ack_tx, ack_rx) = mpsc::sync_channel(0);
        commands
            .send(Command::Stop(action, ack_tx))
            .expect("worker thread is alive");
        ack_rx.recv().expect("worker thread acknowledges stop");

        control.running = false;
        Ok(true)
    }

    /// Returns `true` between a completed `start` and its matching `stop`.
    pub fn is_running(&self) -> bool {
        self.control.lock().unwrap().running
    }

    /// The number of times this service has been started.
    pub fn start_count(&self) -> u64 {
        self.control.lock().unwrap().start_count
    }

    /// The dedicated thread, once the first `start` has created it.
    pub fn thread(&self) -> Option<thread::Thread> {
        self.control.lock().unwrap().thread.clone()
    }

    /// Reads the owned resource in place.
    ///
    /// The resource is `Some` only strictly between a successful start and
    /// its matching stop. It is never handed out by value; the service owns
    /// it until the stop action receives it.
    pub fn with_resource<U>(&self, f: impl FnOnce(Option<&R>) -> U) -> U {
        f(self.resource.lock().unwrap().as_ref())
    }

    /// Returns `true` while the service owns a start-produced resource.
    pub fn has_resource(&self) -> bool {
        self.resource.lock().unwrap().is_some()
    }

    /// Resolves the strategy with handler priority.
    fn resolve(&self) -> Result<WorkerAction<R>> {
        let config = self.config.lock().unwrap();
        let mut dangling = false;
        if let Some(weak) = &config.handler {
            match weak.upgrade() {
                Some(handler) => return Ok(WorkerAction::Handler(handler)),
                None => dangling = true,
            }
        }
        match &config.closures {
            Some((start, stop)) => Ok(WorkerAction::Closures {
                start: start.clone(),
                stop: stop.clone(),
            }),
            None if dangling => Err(ServiceError::HandlerDropped),
            None => Err(ServiceError::NotConfigured),
        }
    }

    /// Spawns the dedicated thread on first use and returns the command
    /// sender.
    fn ensure_thread(&self, control: &mut Control<R>) -> mpsc::Sender<Command<R>> {
        if let Some(commands) = &control.commands {
            return commands.clone();
        }

        let (tx, rx) = mpsc::channel();
        let resource = self.resource.clone();
        let handle = thread::Builder::new()
            .name("tandem-worker".into())
            .spawn(move || worker_loop(resource, rx))
            .expect("spawn worker thread");

        control.thread = Some(handle.thread().clone());
        control.commands = Some(tx.clone());
        tx
    }
}

impl<R: Send + 'static> Default for WorkerService<R> {
    fn default() -> Self {
        Self::new()
    }
}

struct WorkerConfig<R> {
    handler: Option<Weak<dyn WorkerHandler<R>>>,
    closures: Option<(StartAction<R>, StopAction<R>)>,
}

struct Control<R> {
    running: bool,
    start_count: u64,
    commands: Option<mpsc::Sender<Command<R>>>,
    thread: Option<thread::Thread>,
}

enum Command<R> {
    Start(WorkerAction<R>, mpsc::SyncSender<()>),
    Stop(WorkerAction<R>, mpsc::SyncSender<()>),
}

enum WorkerAction<R> {
    Handler(Arc<dyn WorkerHandler<R>>),
    Closures {
        start: StartAction<R>,
        stop: StopAction<R>,
    },
}

impl<R> WorkerAction<R> {
    fn run_start(&self) -> Option<R> {
        match self {
            WorkerAction::Handler(handler) => handler.start_worker(),
            WorkerAction::Closures { start, .. } => start(),
        }
    }

    fn run_stop(&self, resource: Option<R>) {
        match self {
            WorkerAction::Handler(handler) => handler.stop_worker(resource),
            WorkerAction::Closures { stop, .. } => stop(resource),
        }
    }
}

/// The dedicated thread: parks on the command channel, runs each action,
/// publishes the resource, then acknowledges so the caller can return.
fn worker_loop<R: Send + 'static>(
    resource: Arc<Mutex<Option<R>>>,
    commands: mpsc::Receiver<Command<R>>,
) {
    log::debug!("worker thread started");
    while let Ok(command) = commands.recv() {
        match command {
            Command::Start(action, ack) => {
                let started = action.run_start();
                *resource.lock().unwrap() = started;
                let _ = ack.send(());
            }
            Command::Stop(action, ack) => {
                let taken = resource.lock().unwrap().take();
                action.run_stop(taken);
                let _ = ack.send(());
            }
        }
    }
    log::debug!("worker thread exiting");
}
