//! Start/stop lifecycle wrappers for long-running activities.
//!
//! Two flavors of the same idea - an activity that can be idempotently
//! turned on and off, driven by exactly one configured strategy (a weakly
//! held handler or a closure pair):
//!
//! - [`service::Service`] - transitions are guarded, but the start/stop
//!   actions run on whichever thread calls `start`/`stop`
//! - [`worker::WorkerService`] - the actions run on a dedicated worker
//!   thread owned by the service, with `start`/`stop` blocking until the
//!   thread has fully executed them, so callers always observe settled
//!   state
//!
//! Misconfiguration (no strategy, an ambiguous strategy, a dropped
//! handler) is reported as an [`error::ServiceError`] before any state
//! changes; timeouts and cancellation never appear here - lifecycles either
//! transition or they don't.

pub mod error;
pub mod service;
pub mod worker;
