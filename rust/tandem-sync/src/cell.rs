//! A single-assignment, multi-reader value cell with bounded waiting.
//!
//! [`ValueCell`] is the foundation of this crate: a slot that transitions
//! from unassigned to assigned exactly once, no matter how many producers
//! race, and lets any number of readers block (with a per-call wait bound)
//! until the assignment happens. A registered realization callback fires at
//! most once on a completion queue, strictly after the value has become
//! observable to readers.
//!
//! ## State transitions
//!
//! 1. Empty: initial state, waiting for a producer
//! 2. Value: a producer won the assignment race
//! 3. Canceled: the cancellation path of a background computation won the
//!    race instead (never produced by [`set`](ValueCell::set) itself)
//!
//! Unlike a oneshot channel, reading never consumes the slot: every reader,
//! before or after assignment, observes the same value.

use std::{
    sync::{Arc, Condvar, Mutex},
    time::Duration,
};

use tandem_dispatch::Dispatch;

use crate::realize::{Realize, Realized};

/// A single-assignment value cell.
///
/// Handles are cheap clones sharing one slot; the cell lives as long as any
/// handle does. All operations take `&self` and are safe to call from any
/// thread.
pub struct ValueCell<T> {
    core: Arc<CellCore<T>>,
}

impl<T> Clone for ValueCell<T> {
    fn clone(&self) -> ValueCell<T> {
        ValueCell {
            core: self.core.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> ValueCell<T> {
    /// Creates a new, unassigned cell.
    pub fn new() -> ValueCell<T> {
        ValueCell {
            core: Arc::new(CellCore {
                slot: Mutex::new(Slot::Empty),
                cond: Condvar::new(),
                realization: Mutex::new(Realization {
                    callback: None,
                    queue: None,
                }),
            }),
        }
    }

    /// Assigns the cell's value.
    ///
    /// Succeeds only if the cell is still unassigned; concurrent attempts
    /// are serialized and at most one wins. The losing value is handed back
    /// in `Err`. On success every current and future reader observes
    /// `value`, and the realization callback (if registered) is scheduled
    /// onto the completion queue.
    pub fn set(&self, value: T) -> Result<(), T> {
        {
            let mut slot = self.core.slot.lock().unwrap();
            if !matches!(*slot, Slot::Empty) {
                return Err(value);
            }
            *slot = Slot::Value(value);
            self.core.cond.notify_all();
        }
        self.core.dispatch_realization();
        Ok(())
    }

    /// Forces the canceled sentinel through the assignment gate.
    ///
    /// Returns `true` if the sentinel won (the cell was still unassigned).
    /// Reserved for the cancellation path of background computations.
    pub(crate) fn set_canceled(&self) -> bool {
        {
            let mut slot = self.core.slot.lock().unwrap();
            if !matches!(*slot, Slot::Empty) {
                return false;
            }
            *slot = Slot::Canceled;
            self.core.cond.notify_all();
        }
        self.core.dispatch_realization();
        true
    }

    /// Registers the realization callback.
    ///
    /// The callback fires at most once, asynchronously on the completion
    /// queue, with whatever the cell realized to ([`Realized::Value`] or
    /// [`Realized::Canceled`], never [`Realized::TimedOut`]). If the cell
    /// is already realized the callback is scheduled immediately.
    pub fn on_realized<F>(&self, callback: F)
    where
        F: FnOnce(Realized<T>) + Send + 'static,
    {
        let mut realization = self.core.realization.lock().unwrap();
        if let Some(value) = self.core.snapshot() {
            let queue = realization.queue.clone();
            drop(realization);
            crate::run_on_completion_queue(queue, move || callback(value));
            return;
        }
        realization.callback = Some(Box::new(callback));
    }

    /// Selects the completion queue for the realization callback.
    ///
    /// Defaults to the process-wide serial callback queue when never set.
    pub fn set_callback_queue<Q>(&self, queue: Q)
    where
        Q: Dispatch + 'static,
    {
        self.core.realization.lock().unwrap().queue = Some(Arc::new(queue));
    }
}

impl<T: Clone + Send + 'static> Realize<T> for ValueCell<T> {
    fn wait(&self) -> Realized<T> {
        let slot = self.core.slot.lock().unwrap();
        let slot = self
            .core
            .cond
            .wait_while(slot, |slot| matches!(slot, Slot::Empty))
            .unwrap();
        slot.to_realized().expect("cell is assigned")
    }

    fn wait_for(&self, timeout: Duration) -> Realized<T> {
        let slot = self.core.slot.lock().unwrap();
        if let Some(realized) = slot.to_realized() {
            return realized;
        }
        if timeout.is_zero() {
            return Realized::TimedOut;
        }
        let (slot, _) = self
            .core
            .cond
            .wait_timeout_while(slot, timeout, |slot| matches!(slot, Slot::Empty))
            .unwrap();
        slot.to_realized().unwrap_or(Realized::TimedOut)
    }

    fn is_realized(&self) -> bool {
        !matches!(*self.core.slot.lock().unwrap(), Slot::Empty)
    }
}

impl<T: Clone + Send + 'static> Default for ValueCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct CellCore<T> {
    slot: Mutex<Slot<T>>,
    cond: Condvar,
    realization: Mutex<Realization<T>>,
}

impl<T: Clone + Send + 'static> CellCore<T> {
    /// Returns the realized view of the slot, or `None` while unassigned.
    fn snapshot(&self) -> Option<Realized<T>> {
        self.slot.lock().unwrap().to_realized()
    }

    /// Takes the registered callback, if any, and schedules it with the
    /// realized value. Called exactly once per successful assignment; the
    /// take guarantees at-most-once delivery even if a late registration
    /// races the assignment.
    fn dispatch_realization(&self) {
        let mut realization = self.realization.lock().unwrap();
        let Some(callback) = realization.callback.take() else {
            return;
        };
        let queue = realization.queue.clone();
        drop(realization);
        let value = self.snapshot().expect("cell is assigned");
        crate::run_on_completion_queue(queue, move || callback(value));
    }
}

enum Slot<T> {
    Empty,
    Value(T),
    Canceled,
}

impl<T: Clone> Slot<T> {
    fn to_realized(&self) -> Option<Realized<T>> {
        match self {
            Slot::Empty => None,
            Slot::Value(value) => Some(Realized::Value(value.clone())),
            Slot::Canceled => Some(Realized::Canceled),
        }
    }
}

struct Realization<T> {
    callback: Option<Box<dyn FnOnce(Realized<T>) + Send + 'static>>,
    queue: Option<Arc<dyn Dispatch>>,
}
