//! A serial execution queue backed by one dedicated thread.
//!
//! Tasks submitted to a [`SerialQueue`] run in FIFO order on the queue's
//! worker thread, never concurrently with each other. The process-wide
//! [`global()`](SerialQueue::global) instance is the default completion
//! queue for realization callbacks, playing the role a main/UI queue plays
//! on platforms that have one.
//!
//! The queue thread is a cooperative event loop: code already running on it
//! must not block on a condition variable (that would stall every queued
//! task behind it). [`run_until`](SerialQueue::run_until) exists for that
//! situation — it keeps executing queued tasks while polling a predicate,
//! so the loop stays live during a bounded wait.

use std::{
    sync::OnceLock,
    thread,
    time::{Duration, Instant},
};

use crate::{Dispatch, Task, work_queue};

/// How often `run_until` re-evaluates its predicate when no tasks arrive.
/// The predicate can become true through side effects on other threads, so
/// the pump cannot sleep indefinitely between tasks.
const PUMP_SLICE: Duration = Duration::from_millis(10);

/// A handle to a serial execution queue.
///
/// All clones refer to the same dedicated worker thread. The thread exits
/// once every handle has been dropped and the pending tasks have drained.
#[derive(Clone)]
pub struct SerialQueue {
    tx: work_queue::WorkSender<Task>,
    rx: work_queue::WorkReceiver<Task>,
    worker: thread::Thread,
}

impl SerialQueue {
    /// Creates a new serial queue with an unnamed worker thread.
    pub fn new() -> Self {
        Self::with_name(String::new())
    }

    /// Creates a new serial queue whose worker thread carries `name`.
    pub fn with_name(name: impl Into<String>) -> Self {
        let (tx, rx) = work_queue::channel::<Task>();
        let worker_rx = rx.clone();
        let name = name.into();
        let mut builder = thread::Builder::new();
        if !name.is_empty() {
            builder = builder.name(name);
        }
        let handle = builder
            .spawn(move || Self::thread_fn(worker_rx))
            .expect("spawn serial queue thread");
        SerialQueue {
            tx,
            rx,
            worker: handle.thread().clone(),
        }
    }

    /// Returns the process-wide callback queue, lazily initialized on first
    /// use. Realization callbacks land here unless a primitive was given an
    /// explicit completion queue.
    pub fn global() -> &'static SerialQueue {
        static QUEUE: OnceLock<SerialQueue> = OnceLock::new();
        QUEUE.get_or_init(|| SerialQueue::with_name("tandem-callback"))
    }

    /// Submits a task to run on the queue's worker thread, after every task
    /// submitted before it.
    pub fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx.send(Box::new(f)).expect("serial queue thread is alive");
    }

    /// Returns `true` when the calling thread is this queue's worker thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.worker.id()
    }

    /// Runs queued tasks on the calling thread until `condition` returns
    /// `true` or the optional `timeout` elapses.
    ///
    /// Returns `true` if the condition was met, `false` if the deadline
    /// passed first. With no timeout the pump runs until the condition
    /// holds.
    ///
    /// The condition is re-evaluated between tasks and at least every few
    /// milliseconds, so predicates flipped by other threads are noticed
    /// promptly even while the queue is idle.
    ///
    /// # Panics
    ///
    /// Panics when called from any thread other than the queue's own worker
    /// thread: pumping is only meaningful (and only safe for FIFO ordering)
    /// on the thread that owns the loop. Off-queue callers should use a
    /// blocking wait instead.
    pub fn run_until<F>(&self, mut condition: F, timeout: Option<Duration>) -> bool
    where
        F: FnMut() -> bool,
    {
        assert!(
            self.is_current(),
            "run_until must be called from the queue's worker thread"
        );

        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if condition() {
                return true;
            }

            let mut slice = PUMP_SLICE;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return condition();
                }
                slice = slice.min(deadline - now);
            }

            match self.rx.recv_timeout(slice) {
                Ok(task) => task(),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    // Unreachable while `self` holds a sender; treat as an
                    // idle slice.
                }
            }
        }
    }

    fn thread_fn(rx: work_queue::WorkReceiver<Task>) {
        while let Ok(task) = rx.recv() {
            task();
        }
    }
}

impl Dispatch for SerialQueue {
    fn dispatch(&self, task: Task) {
        self.tx.send(task).expect("serial queue thread is alive");
    }
}

impl Default for SerialQueue {
    fn default() -> Self {
        Self::new()
    }
}
