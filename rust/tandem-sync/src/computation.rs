//! A cancelable background computation caching its result in a cell.
//!
//! Construction starts the work immediately on an execution context (the
//! shared worker pool unless told otherwise). The result lands in a
//! [`ValueCell`] and is read through the usual [`Realize`] contract.
//!
//! Cancellation is cooperative: [`cancel`](Computation::cancel) raises an
//! advisory flag the work is expected to poll through its [`CancelToken`],
//! and simultaneously races the canceled sentinel into the cell's
//! single-assignment gate. Whichever producer reaches the gate first wins -
//! a computation that already assigned its value keeps it, and a canceled
//! computation's late value is discarded. Nothing preempts running work.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use tandem_dispatch::{Dispatch, thread_pool::ThreadPool};

use crate::{
    cell::ValueCell,
    realize::{Realize, Realized},
};

/// The cancellation flag a work body is expected to poll.
///
/// The token outlives the work closure; it is owned by the computation and
/// merely borrowed by the work body, so checking it never keeps the
/// computation itself alive.
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Returns `true` once cancellation has been requested.
    ///
    /// Long-running work should check this periodically and return early;
    /// the returned value is then discarded.
    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A computed value, as an alternative to a work closure.
///
/// Implement this when the computation is naturally a type of its own (it
/// carries configuration, or several call sites share it). It receives the
/// same cancellation token a closure would.
pub trait Compute: Send + 'static {
    /// The value produced by the computation.
    type Output: Clone + Send + 'static;

    /// Produces the value. Runs at most once, on the computation's
    /// execution context.
    fn compute(&self, cancel: &CancelToken) -> Self::Output;
}

/// A background computation with a cached, bounded-wait readable result.
///
/// Handles are cheap clones sharing the result slot and cancellation flag.
pub struct Computation<T> {
    cell: ValueCell<T>,
    canceled: Arc<AtomicBool>,
}

impl<T> Clone for Computation<T> {
    fn clone(&self) -> Computation<T> {
        Computation {
            cell: self.cell.clone(),
            canceled: self.canceled.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Computation<T> {
    /// Starts `work` on the shared worker pool.
    pub fn spawn<F>(work: F) -> Computation<T>
    where
        F: FnOnce(&CancelToken) -> T + Send + 'static,
    {
        Self::spawn_on(ThreadPool::global(), work)
    }

    /// Starts `work` on the given execution context.
    ///
    /// The work body receives a [`CancelToken`] and is expected to consult
    /// it during long-running stretches; nothing forces it to.
    pub fn spawn_on<F>(queue: &dyn Dispatch, work: F) -> Computation<T>
    where
        F: FnOnce(&CancelToken) -> T + Send + 'static,
    {
        let computation = Computation {
            cell: ValueCell::new(),
            canceled: Arc::new(AtomicBool::new(false)),
        };

        let cell = computation.cell.clone();
        let token = CancelToken {
            flag: computation.canceled.clone(),
        };
        queue.dispatch(Box::new(move || {
            let value = work(&token);
            // A lost race means cancellation got there first; the late
            // value is intentionally discarded.
            let _ = cell.set(value);
        }));

        computation
    }

    /// Starts a [`Compute`] implementation on the shared worker pool.
    pub fn spawn_compute<C>(compute: C) -> Computation<T>
    where
        C: Compute<Output = T>,
    {
        Self::spawn_compute_on(ThreadPool::global(), compute)
    }

    /// Starts a [`Compute`] implementation on the given execution context.
    pub fn spawn_compute_on<C>(queue: &dyn Dispatch, compute: C) -> Computation<T>
    where
        C: Compute<Output = T>,
    {
        Self::spawn_on(queue, move |cancel| compute.compute(cancel))
    }

    /// Requests cancellation. Idempotent, callable from any thread.
    ///
    /// Raises the advisory flag and races the canceled sentinel into the
    /// result slot. If the work already assigned its value the value
    /// stands; otherwise every reader, current and future, observes
    /// [`Realized::Canceled`].
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        self.cell.set_canceled();
    }

    /// Returns `true` once cancellation has been requested, whether or not
    /// the sentinel won the assignment race.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Registers the realization callback on the underlying cell.
    ///
    /// The callback observes whatever won the race - the computed value or
    /// the canceled sentinel.
    pub fn on_realized<F>(&self, callback: F)
    where
        F: FnOnce(Realized<T>) + Send + 'static,
    {
        self.cell.on_realized(callback);
    }

    /// Selects the completion queue for the realization callback.
    pub fn set_callback_queue<Q>(&self, queue: Q)
    where
        Q: Dispatch + 'static,
    {
        self.cell.set_callback_queue(queue);
    }
}

impl<T: Clone + Send + 'static> Realize<T> for Computation<T> {
    fn wait(&self) -> Realized<T> {
        self.cell.wait()
    }

    fn wait_for(&self, timeout: Duration) -> Realized<T> {
        self.cell.wait_for(timeout)
    }

    fn is_realized(&self) -> bool {
        self.cell.is_realized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::mpsc, thread, time::Duration};

    #[test]
    fn test_computes_and_caches() {
        let computation = Computation::spawn(|_| 6 * 7);
        assert_eq!(computation.wait(), Realized::Value(42));
        // Cached: immediate on subsequent reads.
        assert_eq!(computation.wait_for(Duration::ZERO), Realized::Value(42));
    }

    #[test]
    fn test_runs_on_given_queue() {
        let queue = tandem_dispatch::serial_queue::SerialQueue::with_name("compute-q");
        let probe = queue.clone();
        let computation = Computation::spawn_on(&queue, move |_| probe.is_current());
        assert_eq!(computation.wait(), Realized::Value(true));
    }

    #[test]
    fn test_cancel_before_work_observes_flag() {
        let (started_tx, started_rx) = mpsc::channel();
        let computation = Computation::spawn(move |cancel: &CancelToken| {
            started_tx.send(()).unwrap();
            // Cooperative loop: spin until cancellation is visible, then
            // return a value that must lose the assignment race.
            while !cancel.is_canceled() {
                thread::sleep(Duration::from_millis(1));
            }
            "late value"
        });

        started_rx.recv().unwrap();
        computation.cancel();

        assert!(computation.is_canceled());
        assert_eq!(computation.wait(), Realized::Canceled);
        // The late value never displaces the sentinel.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(computation.wait_for(Duration::ZERO), Realized::Canceled);
    }

    #[test]
    fn test_cancel_after_completion_keeps_value() {
        let computation = Computation::spawn(|_| "winner");
        assert_eq!(computation.wait(), Realized::Value("winner"));

        computation.cancel();
        assert!(computation.is_canceled());
        assert_eq!(computation.wait(), Realized::Value("winner"));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let computation = Computation::<u32>::spawn(|cancel| {
            while !cancel.is_canceled() {
                thread::sleep(Duration::from_millis(1));
            }
            0
        });
        computation.cancel();
        computation.cancel();
        assert_eq!(computation.wait(), Realized::Canceled);
    }

    #[test]
    fn test_cancel_unblocks_waiters() {
        let computation = Computation::<u32>::spawn(|cancel| {
            while !cancel.is_canceled() {
                thread::sleep(Duration::from_millis(1));
            }
            0
        });

        let mut handles = Vec::new();
        for _ in 0..4 {
            let computation = computation.clone();
            handles.push(thread::spawn(move || computation.wait()));
        }

        thread::sleep(Duration::from_millis(30));
        computation.cancel();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Realized::Canceled);
        }
    }

    #[test]
    fn test_callback_observes_cancellation() {
        let (started_tx, started_rx) = mpsc::channel();
        let computation = Computation::spawn(move |cancel: &CancelToken| {
            started_tx.send(()).unwrap();
            while !cancel.is_canceled() {
                thread::sleep(Duration::from_millis(1));
            }
            0
        });

        let (tx, rx) = mpsc::channel();
        computation.on_realized(move |realized| tx.send(realized).unwrap());

        started_rx.recv().unwrap();
        computation.cancel();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Realized::Canceled
        );
    }

    #[test]
    fn test_compute_trait_override() {
        struct Doubler {
            n: u32,
        }

        impl Compute for Doubler {
            type Output = u32;

            fn compute(&self, _cancel: &CancelToken) -> u32 {
                self.n * 2
            }
        }

        let computation = Computation::spawn_compute(Doubler { n: 21 });
        assert_eq!(computation.wait(), Realized::Value(42));
    }
}
