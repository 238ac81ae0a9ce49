//! An externally-delivered result with a one-time, object-wide expiry.
//!
//! A [`Promise`] is handed to some producer that may or may not deliver a
//! value in time. Unlike a [`ValueCell`](crate::cell::ValueCell), whose
//! timeout is purely a per-call wait bound, the promise's timeout is fixed
//! at construction and forecloses delivery permanently: once the deadline
//! passes undelivered, the promise is invalid forever, every read returns
//! the timeout sentinel without blocking, and late deliveries are silently
//! ignored.
//!
//! The expiry is enforced lazily under the state lock - by whichever
//! deliverer, reader, or validity check first observes that the deadline
//! has passed - so no timer thread exists and the delivered/expired
//! decision is race-free.

use std::{
    sync::{Arc, Condvar, Mutex},
    time::{Duration, Instant},
};

use tandem_dispatch::Dispatch;

use crate::realize::{Realize, Realized};

/// A deliver-once value that expires if unfulfilled.
///
/// Handles are cheap clones sharing one underlying slot.
pub struct Promise<T> {
    core: Arc<PromiseCore<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Promise<T> {
        Promise {
            core: self.core.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Creates a promise that accepts a delivery for the next `timeout`.
    pub fn new(timeout: Duration) -> Promise<T> {
        Promise {
            core: Arc::new(PromiseCore {
                state: Mutex::new(PromiseState::Pending),
                cond: Condvar::new(),
                deadline: Instant::now() + timeout,
                delivery: Mutex::new(DeliveryState {
                    callback: None,
                    queue: None,
                }),
            }),
        }
    }

    /// Delivers the value.
    ///
    /// Succeeds and returns `true` only if the promise is still pending and
    /// the deadline has not passed. A duplicate or late delivery is a
    /// silent no-op returning `false` - not an error.
    pub fn deliver(&self, value: T) -> bool {
        {
            let mut state = self.core.state.lock().unwrap();
            if !matches!(*state, PromiseState::Pending) {
                return false;
            }
            if Instant::now() >= self.core.deadline {
                *state = PromiseState::Expired;
                self.core.cond.notify_all();
                return false;
            }
            *state = PromiseState::Delivered(value);
            self.core.cond.notify_all();
        }
        self.core.dispatch_delivery();
        true
    }

    /// Returns `false` once the deadline has passed with no delivery.
    ///
    /// Readable at any time from any thread; never reverts to `true`. A
    /// promise that was delivered in time stays valid forever.
    pub fn is_valid(&self) -> bool {
        let mut state = self.core.state.lock().unwrap();
        self.core.expire_if_due(&mut state);
        !matches!(*state, PromiseState::Expired)
    }

    /// Registers the delivery callback.
    ///
    /// Fires at most once, asynchronously on the completion queue, with the
    /// delivered value. Expiry does not fire it. Registering after a
    /// successful delivery fires it immediately; registering after expiry
    /// discards it.
    pub fn on_delivered<F>(&self, callback: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        let mut delivery = self.core.delivery.lock().unwrap();
        let state = self.core.state.lock().unwrap();
        match &*state {
            PromiseState::Delivered(value) => {
                let value = value.clone();
                drop(state);
                let queue = delivery.queue.clone();
                drop(delivery);
                crate::run_on_completion_queue(queue, move || callback(value));
            }
            PromiseState::Expired => {}
            PromiseState::Pending => {
                drop(state);
                delivery.callback = Some(Box::new(callback));
            }
        }
    }

    /// Selects the completion queue for the delivery callback.
    ///
    /// Defaults to the process-wide serial callback queue when never set.
    pub fn set_callback_queue<Q>(&self, queue: Q)
    where
        Q: Dispatch + 'static,
    {
        self.core.delivery.lock().unwrap().queue = Some(Arc::new(queue));
    }
}

impl<T: Clone + Send + 'static> Realize<T> for Promise<T> {
    fn wait(&self) -> Realized<T> {
        self.core.wait_until(None)
    }

    fn wait_for(&self, timeout: Duration) -> Realized<T> {
        self.core.wait_until(Some(Instant::now() + timeout))
    }

    fn is_realized(&self) -> bool {
        let mut state = self.core.state.lock().unwrap();
        self.core.expire_if_due(&mut state);
        !matches!(*state, PromiseState::Pending)
    }
}

struct PromiseCore<T> {
    state: Mutex<PromiseState<T>>,
    cond: Condvar,
    deadline: Instant,
    delivery: Mutex<DeliveryState<T>>,
}

impl<T: Clone + Send + 'static> PromiseCore<T> {
    /// Flips a pending promise to expired if its deadline has passed.
    /// The flip happens exactly once; waiters are woken when it does.
    fn expire_if_due(&self, state: &mut PromiseState<T>) {
        if matches!(state, PromiseState::Pending) && Instant::now() >= self.deadline {
            *state = PromiseState::Expired;
            self.cond.notify_all();
        }
    }

    /// Blocks until delivery, expiry, or the optional per-call deadline.
    fn wait_until(&self, call_deadline: Option<Instant>) -> Realized<T> {
        let mut state = self.state.lock().unwrap();
        loop {
            match &*state {
                PromiseState::Delivered(value) => return Realized::Value(value.clone()),
                PromiseState::Expired => return Realized::TimedOut,
                PromiseState::Pending => {}
            }

            let now = Instant::now();
            if now >= self.deadline {
                *state = PromiseState::Expired;
                self.cond.notify_all();
                return Realized::TimedOut;
            }

            // The per-call bound expiring first leaves the promise pending
            // and still deliverable.
            let mut wake = self.deadline;
            if let Some(call_deadline) = call_deadline {
                if now >= call_deadline {
                    return Realized::TimedOut;
                }
                wake = wake.min(call_deadline);
            }

            let (guard, _) = self.cond.wait_timeout(state, wake - now).unwrap();
            state = guard;
        }
    }

    fn dispatch_delivery(&self) {
        let mut delivery = self.delivery.lock().unwrap();
        let Some(callback) = delivery.callback.take() else {
            return;
        };
        let queue = delivery.queue.clone();
        drop(delivery);
        let value = match &*self.state.lock().unwrap() {
            PromiseState::Delivered(value) => value.clone(),
            _ => return,
        };
        crate::run_on_completion_queue(queue, move || callback(value));
    }
}

enum PromiseState<T> {
    Pending,
    Delivered(T),
    Expired,
}

struct DeliveryState<T> {
    callback: Option<Box<dyn FnOnce(T) + Send + 'static>>,
    queue: Option<Arc<dyn Dispatch>>,
}
