//! An idempotent start/stop state machine for a long-running activity.
//!
//! [`Service`] wraps anything that can be turned on and off - a socket
//! reader, a poller, a subscription - and guarantees the on/off transitions
//! are raced safely while the actual start/stop logic runs on the calling
//! thread.
//!
//! Exactly one start/stop strategy must be configured before the first
//! `start`: either a [`ServiceHandler`] (held weakly - the service never
//! keeps its handler alive) or a start/stop closure pair. Configuring none
//! or both is a configuration error reported by `start`/`stop` before
//! anything transitions.
//!
//! The start/stop actions execute on whichever thread calls
//! [`start`](Service::start)/[`stop`](Service::stop), outside the state
//! lock; their own thread-safety is the caller's concern. Callers that want
//! the actions on a dedicated thread should use
//! [`WorkerService`](crate::worker::WorkerService) instead.

use std::sync::{Arc, Mutex, Weak};

use crate::error::{Result, ServiceError};

/// The delegate flavor of a [`Service`] strategy.
///
/// The service holds the handler weakly; if the handler has been dropped by
/// the time `start`/`stop` is called, the call fails with
/// [`ServiceError::HandlerDropped`] rather than assuming liveness.
pub trait ServiceHandler: Send + Sync {
    /// Begin the activity. Called synchronously from `start`.
    fn on_start(&self);

    /// End the activity and prepare for a possible restart. Called
    /// synchronously from `stop`.
    fn on_stop(&self);
}

type Action = Arc<dyn Fn() + Send + Sync>;

/// A start/stop lifecycle wrapper.
///
/// All methods take `&self`; share the service between threads with an
/// `Arc`.
pub struct Service {
    config: Mutex<Config>,
    state: Mutex<LifeState>,
}

impl Service {
    /// Creates an unconfigured service. A strategy must be set before the
    /// first `start`.
    pub fn new() -> Service {
        Service {
            config: Mutex::new(Config {
                handler: None,
                closures: None,
            }),
            state: Mutex::new(LifeState {
                phase: Phase::Stopped,
                start_count: 0,
            }),
        }
    }

    /// Creates a service driven by `handler`.
    pub fn with_handler<H>(handler: &Arc<H>) -> Service
    where
        H: ServiceHandler + 'static,
    {
        let service = Service::new();
        service.set_handler(handler);
        service
    }

    /// Creates a service driven by a start/stop closure pair.
    pub fn with_closures<S, P>(start: S, stop: P) -> Service
    where
        S: Fn() + Send + Sync + 'static,
        P: Fn() + Send + Sync + 'static,
    {
        let service = Service::new();
        service.set_closures(start, stop);
        service
    }

    /// Configures the handler strategy. The handler is held weakly.
    pub fn set_handler<H>(&self, handler: &Arc<H>)
    where
        H: ServiceHandler + 'static,
    {
        let handler: Arc<dyn ServiceHandler> = handler.clone();
        let weak: Weak<dyn ServiceHandler> = Arc::downgrade(&handler);
        self.config.lock().unwrap().handler = Some(weak);
    }

    /// Configures the closure strategy.
    ///
    /// The closures may be invoked many times across restart cycles.
    pub fn set_closures<S, P>(&self, start: S, stop: P)
    where
        S: Fn() + Send + Sync + 'static,
        P: Fn() + Send + Sync + 'static,
    {
        let mut config = self.config.lock().unwrap();
        config.closures = Some((Arc::new(start), Arc::new(stop)));
    }

    /// Starts the service.
    ///
    /// Returns `Ok(false)` if already running. Otherwise increments the
    /// start count, marks the service running, invokes the start action on
    /// the calling thread, and returns `Ok(true)`.
    ///
    /// Fails with a [`ServiceError`] - leaving the service stopped - when
    /// the strategy is missing, ambiguous, or dropped.
    pub fn start(&self) -> Result<bool> {
        let resolved;
        {
            let mut state = self.state.lock().unwrap();
            if state.phase != Phase::Stopped {
                return Ok(false);
            }
            resolved = self.resolve()?;
            state.phase = Phase::Running;
            state.start_count += 1;
        }
        log::debug!("service starting");
        resolved.start();
        Ok(true)
    }

    /// Stops the service.
    ///
    /// Returns `Ok(false)` if not running. Otherwise invokes the stop
    /// action on the calling thread, then marks the service stopped.
    /// [`is_running`](Service::is_running) stays `true` for the duration of
    /// the stop action.
    pub fn stop(&self) -> Result<bool> {
        let resolved;
        {
            let mut state = self.state.lock().unwrap();
            if state.phase != Phase::Running {
                return Ok(false);
            }
            resolved = self.resolve()?;
            state.phase = Phase::Stopping;
        }
        log::debug!("service stopping");
        resolved.stop();
        self.state.lock().unwrap().phase = Phase::Stopped;
        Ok(true)
    }

    /// Returns `true` from the moment `start` claims the transition until
    /// the matching `stop` action has completed.
    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().phase != Phase::Stopped
    }

    /// The number of times this service has been started.
    pub fn start_count(&self) -> u64 {
        self.state.lock().unwrap().start_count
    }

    /// Validates the configuration and resolves it to callable form.
    ///
    /// Resolution snapshots the strategy (upgrading the weak handler) so
    /// the action can run outside the config lock.
    fn resolve(&self) -> Result<Resolved> {
        let config = self.config.lock().unwrap();
        match (&config.handler, &config.closures) {
            (Some(_), Some(_)) => Err(ServiceError::AmbiguousStrategy),
            (None, None) => Err(ServiceError::NotConfigured),
            (Some(weak), None) => weak
                .upgrade()
                .map(Resolved::Handler)
                .ok_or(ServiceError::HandlerDropped),
            (None, Some((start, stop))) => Ok(Resolved::Closures {
                start: start.clone(),
                stop: stop.clone(),
            }),
        }
    }
}

impl Default for Service {
    fn default() -> Self {
        Self::new()
    }
}

struct Config {
    handler: Option<Weak<dyn ServiceHandler>>,
    closures: Option<(Action, Action)>,
}

struct LifeState {
    phase: Phase,
    start_count: u64,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Stopped,
    Running,
    Stopping,
}

enum Resolved {
    Handler(Arc<dyn ServiceHandler>),
    Closures { start: Action, stop: Action },
}

impl Resolved {
    fn start(&self) {
        match self {
            Resolved::Handler(handler) => handler.on_start(),
            Resolved::Closures { start, .. } => start(),
        }
    }

    fn stop(&self) {
        match self {
            Resolved::Handler(handler) => handler.on_stop(),
            Resolved::Closures { stop, .. } => stop(),
        }
    }
}
