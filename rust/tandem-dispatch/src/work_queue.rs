//! A blocking, unbounded multi-producer, multi-consumer work queue.
//!
//! This is the distribution substrate for the execution contexts in this
//! crate: [`ThreadPool`](crate::thread_pool::ThreadPool) workers and the
//! [`SerialQueue`](crate::serial_queue::SerialQueue) thread all drain one of
//! these queues. It is intentionally minimal compared to a general-purpose
//! channel: unbounded only, with just enough connectivity tracking to let
//! worker threads exit once every sender handle is gone.
//!
//! Error types are reused from `std::sync::mpsc` so call sites read like
//! standard channel code.

use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex},
    time::{Duration, Instant},
};

/// Creates a new unbounded work queue, returning the sender/receiver halves.
///
/// Both halves can be cloned freely. Items are delivered in FIFO order to
/// whichever receiver dequeues first. When the last [`WorkSender`] is
/// dropped, blocked receivers wake up and observe the disconnect; when the
/// last [`WorkReceiver`] is dropped, pending items are discarded and
/// subsequent sends fail.
pub fn channel<T>() -> (WorkSender<T>, WorkReceiver<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(QueueState {
            items: VecDeque::new(),
            senders: 1,
            receivers: 1,
        }),
        ready: Condvar::new(),
    });
    (WorkSender(shared.clone()), WorkReceiver(shared))
}

/// The producing half of a work queue.
pub struct WorkSender<T>(Arc<Shared<T>>);

impl<T> WorkSender<T> {
    /// Enqueues an item.
    ///
    /// Returns `Err` with the item when every receiver has been dropped and
    /// the item can never be dequeued.
    pub fn send(&self, item: T) -> Result<(), std::sync::mpsc::SendError<T>> {
        let mut state = self.0.state.lock().unwrap();
        if state.receivers == 0 {
            return Err(std::sync::mpsc::SendError(item));
        }
        state.items.push_back(item);
        drop(state);
        self.0.ready.notify_one();
        Ok(())
    }
}

impl<T> Clone for WorkSender<T> {
    fn clone(&self) -> WorkSender<T> {
        self.0.state.lock().unwrap().senders += 1;
        WorkSender(self.0.clone())
    }
}

impl<T> Drop for WorkSender<T> {
    fn drop(&mut self) {
        let mut state = self.0.state.lock().unwrap();
        state.senders -= 1;
        if state.senders == 0 {
            // Wake blocked receivers so they can observe the disconnect.
            drop(state);
            self.0.ready.notify_all();
        }
    }
}

/// The consuming half of a work queue.
pub struct WorkReceiver<T>(Arc<Shared<T>>);

impl<T> WorkReceiver<T> {
    /// Blocks until an item is available or every sender has been dropped.
    pub fn recv(&self) -> Result<T, std::sync::mpsc::RecvError> {
        let mut state = self.0.state.lock().unwrap();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Ok(item);
            }
            if state.senders == 0 {
                return Err(std::sync::mpsc::RecvError);
            }
            state = self.0.ready.wait(state).unwrap();
        }
    }

    /// Blocks up to `timeout` for an item.
    ///
    /// The timeout is a deadline across spurious wakeups, not a per-wait
    /// duration.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, std::sync::mpsc::RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.0.state.lock().unwrap();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Ok(item);
            }
            if state.senders == 0 {
                return Err(std::sync::mpsc::RecvTimeoutError::Disconnected);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(std::sync::mpsc::RecvTimeoutError::Timeout);
            }
            let (guard, _) = self.0.ready.wait_timeout(state, deadline - now).unwrap();
            state = guard;
        }
    }

    /// Dequeues an item without blocking.
    pub fn try_recv(&self) -> Result<T, std::sync::mpsc::TryRecvError> {
        let mut state = self.0.state.lock().unwrap();
        if let Some(item) = state.items.pop_front() {
            return Ok(item);
        }
        if state.senders == 0 {
            return Err(std::sync::mpsc::TryRecvError::Disconnected);
        }
        Err(std::sync::mpsc::TryRecvError::Empty)
    }
}

impl<T> Clone for WorkReceiver<T> {
    fn clone(&self) -> WorkReceiver<T> {
        self.0.state.lock().unwrap().receivers += 1;
        WorkReceiver(self.0.clone())
    }
}

impl<T> Drop for WorkReceiver<T> {
    fn drop(&mut self) {
        let mut state = self.0.state.lock().unwrap();
        state.receivers -= 1;
        if state.receivers == 0 {
            // No one is left to dequeue; release pending items eagerly.
            state.items.clear();
        }
    }
}

struct Shared<T> {
    state: Mutex<QueueState<T>>,
    ready: Condvar,
}

struct QueueState<T> {
    items: VecDeque<T>,
    senders: usize,
    receivers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};

    #[test]
    fn test_send_recv_fifo() {
        let (tx, rx) = channel::<i32>();
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        tx.send(3).unwrap();
        assert_eq!(rx.recv().unwrap(), 1);
        assert_eq!(rx.recv().unwrap(), 2);
        assert_eq!(rx.recv().unwrap(), 3);
    }

    #[test]
    fn test_recv_blocks_until_send() {
        let (tx, rx) = channel::<&str>();
        let handle = thread::spawn(move || rx.recv().unwrap());
        thread::sleep(Duration::from_millis(50));
        tx.send("late").unwrap();
        assert_eq!(handle.join().unwrap(), "late");
    }

    #[test]
    fn test_recv_timeout_expires() {
        let (tx, rx) = channel::<i32>();
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(20)),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout)
        );
        tx.send(7).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_millis(20)).unwrap(), 7);
    }

    #[test]
    fn test_disconnect_wakes_receivers() {
        let (tx, rx) = channel::<i32>();
        let rx2 = rx.clone();
        let h1 = thread::spawn(move || rx.recv());
        let h2 = thread::spawn(move || rx2.recv());
        thread::sleep(Duration::from_millis(50));
        drop(tx);
        assert!(h1.join().unwrap().is_err());
        assert!(h2.join().unwrap().is_err());
    }

    #[test]
    fn test_send_fails_without_receivers() {
        let (tx, rx) = channel::<i32>();
        drop(rx);
        assert!(tx.send(1).is_err());
    }

    #[test]
    fn test_try_recv() {
        let (tx, rx) = channel::<i32>();
        assert_eq!(rx.try_recv(), Err(std::sync::mpsc::TryRecvError::Empty));
        tx.send(5).unwrap();
        assert_eq!(rx.try_recv().unwrap(), 5);
        drop(tx);
        assert_eq!(
            rx.try_recv(),
            Err(std::sync::mpsc::TryRecvError::Disconnected)
        );
    }

    #[test]
    fn test_multi_producer_multi_consumer() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 3;
        const PER_PRODUCER: usize = 500;

        let (tx, rx) = channel::<usize>();
        thread::scope(|s| {
            for i in 0..PRODUCERS {
                let tx = tx.clone();
                s.spawn(move || {
                    for j in 0..PER_PRODUCER {
                        tx.send(i * PER_PRODUCER + j).unwrap();
                    }
                });
            }
            drop(tx);

            let mut handles = Vec::new();
            for _ in 0..CONSUMERS {
                let rx = rx.clone();
                handles.push(s.spawn(move || {
                    let mut seen = Vec::new();
                    while let Ok(item) = rx.recv() {
                        seen.push(item);
                    }
                    seen
                }));
            }
            drop(rx);

            let mut all: Vec<usize> = handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect();
            all.sort();
            let expected: Vec<usize> = (0..PRODUCERS * PER_PRODUCER).collect();
            assert_eq!(all, expected);
        });
    }
}
