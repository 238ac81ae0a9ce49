//! Cross-thread value synchronization primitives.
//!
//! This crate provides a small family of primitives for handing a value
//! from one thread to others, all sharing the bounded-wait read contract
//! defined in [`realize`]:
//!
//! - [`cell::ValueCell`] - a single-assignment, multi-reader value cell;
//!   the foundation the others build on
//! - [`computation::Computation`] - a cancelable background computation
//!   whose result is cached in a cell
//! - [`promise::Promise`] - an externally-delivered result that becomes
//!   permanently invalid once its deadline passes unfulfilled
//!
//! # Sentinels, not errors
//!
//! Timeouts and cancellation are ordinary outcomes here, signaled by the
//! reserved [`realize::Realized`] variants rather than by `Result` errors.
//! The sentinels are distinguishable from every producible value, including
//! a legitimate `None` payload. Nothing in this crate recovers from failing
//! user work - a work body that can fail encodes the failure in its own
//! return type.
//!
//! # Completion queues
//!
//! Each primitive can carry one realization callback, fired at most once on
//! a completion queue (the process-wide serial callback queue unless
//! configured otherwise), strictly after the value is observable to
//! readers.

pub mod cell;
pub mod computation;
pub mod promise;
pub mod realize;

use std::sync::Arc;

use tandem_dispatch::{Dispatch, serial_queue::SerialQueue};

/// Schedules a realization callback onto the chosen completion queue,
/// falling back to the process-wide serial callback queue.
pub(crate) fn run_on_completion_queue(
    queue: Option<Arc<dyn Dispatch>>,
    task: impl FnOnce() + Send + 'static,
) {
    match queue {
        Some(queue) => queue.dispatch(Box::new(task)),
        None => SerialQueue::global().dispatch(Box::new(task)),
    }
}
