//! A shared worker pool for fire-and-forget task execution.
//!
//! This module provides the pool that background computations target by
//! default. Tasks are distributed to a fixed set of worker threads through
//! an internal [`work_queue`](crate::work_queue); each worker runs a loop
//! that drains tasks until every pool handle has been dropped.

use std::{sync::OnceLock, thread};

use crate::{Dispatch, Task, work_queue};

/// A fixed-size pool of worker threads executing submitted tasks.
///
/// `ThreadPool` implements [`Clone`]; all clones share the same worker
/// threads, so separate parts of an application can feed the same pool.
/// Worker threads exit once the last handle is dropped and the queue
/// drains.
#[derive(Clone)]
pub struct ThreadPool(work_queue::WorkSender<Task>);

impl ThreadPool {
    /// Creates a new `ThreadPool` with `num_threads` unnamed worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is 0.
    pub fn new(num_threads: usize) -> Self {
        Self::with_thread_name(num_threads, |_| String::new())
    }

    /// Creates a new `ThreadPool` with `num_threads` worker threads, naming
    /// each one with `thread_name(index)`.
    ///
    /// Thread names show up in debuggers and profilers; an empty name leaves
    /// the thread unnamed.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is 0.
    pub fn with_thread_name(num_threads: usize, thread_name: impl Fn(usize) -> String) -> Self {
        assert_ne!(num_threads, 0);

        let (tx, rx) = work_queue::channel::<Task>();
        for i in 0..num_threads {
            let rx = rx.clone();
            let mut builder = thread::Builder::new();
            let name = thread_name(i);
            if !name.is_empty() {
                builder = builder.name(name);
            }
            builder
                .spawn(move || Self::thread_fn(rx))
                .expect("spawn pool worker thread");
        }

        ThreadPool(tx)
    }

    /// Creates a `ThreadPool` sized to the system's available parallelism,
    /// falling back to 8 threads when it cannot be determined.
    pub fn with_default_threads() -> Self {
        let num_threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8);
        Self::new(num_threads)
    }

    /// Returns the process-wide shared pool, lazily initialized on first use
    /// with default sizing and `tandem-pool-N` thread names.
    ///
    /// This is the default execution context for background computations.
    pub fn global() -> &'static ThreadPool {
        static POOL: OnceLock<ThreadPool> = OnceLock::new();
        POOL.get_or_init(|| {
            let num_threads = thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(8);
            ThreadPool::with_thread_name(num_threads, |i| format!("tandem-pool-{i}"))
        })
    }

    /// Submits a task for execution on one of the worker threads.
    ///
    /// There is no completion handle; callers that need the result should
    /// pair the task with a synchronization primitive.
    pub fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.0.send(Box::new(f)).expect("pool has live worker threads");
    }

    fn thread_fn(rx: work_queue::WorkReceiver<Task>) {
        while let Ok(task) = rx.recv() {
            task();
        }
    }
}

impl Dispatch for ThreadPool {
    fn dispatch(&self, task: Task) {
        self.0.send(task).expect("pool has live worker threads");
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::with_default_threads()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::{Duration, Instant},
    };

    #[test]
    fn test_new_thread_pool() {
        let pool = ThreadPool::new(2);
        drop(pool);
    }

    #[test]
    #[should_panic]
    fn test_new_thread_pool_zero_threads() {
        ThreadPool::new(0);
    }

    #[test]
    fn test_spawn_runs_tasks() {
        let pool = ThreadPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = counter.clone();
            pool.spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while counter.load(Ordering::SeqCst) != 10 {
            assert!(Instant::now() < deadline, "tasks did not complete");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_concurrent_task_execution() {
        let pool = ThreadPool::new(4);
        let start_time = Instant::now();
        let sleep_duration = Duration::from_millis(50);
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let done = done.clone();
            pool.spawn(move || {
                std::thread::sleep(sleep_duration);
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        while done.load(Ordering::SeqCst) != 4 {
            std::thread::sleep(Duration::from_millis(2));
        }

        // 4 threads running 4 sleeping tasks should overlap almost entirely.
        assert!(start_time.elapsed() < sleep_duration * 2);
    }

    #[test]
    fn test_thread_pool_clone_shares_workers() {
        let pool1 = ThreadPool::new(2);
        let pool2 = pool1.clone();
        let log = Arc::new(Mutex::new(Vec::new()));

        let log1 = log.clone();
        pool1.spawn(move || log1.lock().unwrap().push("a"));
        let log2 = log.clone();
        pool2.spawn(move || log2.lock().unwrap().push("b"));

        std::thread::sleep(Duration::from_millis(100));
        let mut entries = log.lock().unwrap().clone();
        entries.sort();
        assert_eq!(entries, vec!["a", "b"]);
    }

    #[test]
    fn test_global_thread_pool() {
        let global1 = ThreadPool::global();
        let global2 = ThreadPool::global();
        assert!(std::ptr::eq(global1, global2));

        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        global1.spawn(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let deadline = Instant::now() + Duration::from_secs(5);
        while counter.load(Ordering::SeqCst) != 1 {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}
