//! End-to-end lifecycle tests: a worker service driving a realistic
//! long-running activity through repeated start/stop cycles.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

use tandem_service::{
    error::ServiceError,
    service::Service,
    worker::{WorkerHandler, WorkerService},
};

/// A stand-in for something like a socket reader: a pump thread that keeps
/// draining a channel until told to shut down.
struct Pump {
    shutdown: Arc<AtomicBool>,
    drained: Arc<AtomicUsize>,
    feed: mpsc::Sender<u32>,
}

fn spawn_pump() -> Pump {
    let shutdown = Arc::new(AtomicBool::new(false));
    let drained = Arc::new(AtomicUsize::new(0));
    let (feed, rx) = mpsc::channel::<u32>();

    {
        let shutdown = shutdown.clone();
        let drained = drained.clone();
        thread::spawn(move || {
            while !shutdown.load(Ordering::SeqCst) {
                match rx.recv_timeout(Duration::from_millis(5)) {
                    Ok(_) => {
                        drained.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
        });
    }

    Pump {
        shutdown,
        drained,
        feed,
    }
}

#[test]
fn worker_service_owns_a_live_activity() {
    let service = WorkerService::with_closures(
        || Some(spawn_pump()),
        |pump: Option<Pump>| {
            if let Some(pump) = pump {
                pump.shutdown.store(true, Ordering::SeqCst);
            }
        },
    );

    service.start().unwrap();
    assert!(service.is_running());

    // Feed the running activity through the owned resource.
    let drained = service.with_resource(|pump| {
        let pump = pump.expect("resource published after start");
        for i in 0..10 {
            pump.feed.send(i).unwrap();
        }
        pump.drained.clone()
    });

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while drained.load(Ordering::SeqCst) != 10 {
        assert!(std::time::Instant::now() < deadline, "pump never drained");
        thread::sleep(Duration::from_millis(5));
    }

    service.stop().unwrap();
    assert!(!service.has_resource());
    assert!(!service.is_running());
}

#[test]
fn worker_service_survives_many_cycles() {
    let service = WorkerService::<u64>::with_closures(|| Some(1), |_| {});

    for cycle in 1..=10 {
        assert_eq!(service.start(), Ok(true));
        assert_eq!(service.start_count(), cycle);
        assert!(service.has_resource());
        assert_eq!(service.stop(), Ok(true));
        assert!(!service.has_resource());
    }
}

#[test]
fn handler_driven_worker_service() {
    struct Reader {
        sessions: Mutex<Vec<&'static str>>,
    }

    impl WorkerHandler<&'static str> for Reader {
        fn start_worker(&self) -> Option<&'static str> {
            self.sessions.lock().unwrap().push("open");
            Some("session")
        }

        fn stop_worker(&self, resource: Option<&'static str>) {
            assert_eq!(resource, Some("session"));
            self.sessions.lock().unwrap().push("close");
        }
    }

    let handler = Arc::new(Reader {
        sessions: Mutex::new(Vec::new()),
    });
    let service = WorkerService::with_handler(&handler);

    service.start().unwrap();
    service.stop().unwrap();
    service.start().unwrap();
    service.stop().unwrap();

    assert_eq!(
        *handler.sessions.lock().unwrap(),
        vec!["open", "close", "open", "close"]
    );
}

#[test]
fn plain_service_and_worker_service_agree_on_errors() {
    let plain = Service::new();
    let worker = WorkerService::<u32>::new();

    assert_eq!(plain.start(), Err(ServiceError::NotConfigured));
    assert_eq!(worker.start(), Err(ServiceError::NotConfigured));
    assert!(!plain.is_running());
    assert!(!worker.is_running());
}

#[test]
fn concurrent_worker_starts_serialize() {
    let starts = Arc::new(AtomicUsize::new(0));
    let service = {
        let starts = starts.clone();
        Arc::new(WorkerService::<u32>::with_closures(
            move || {
                starts.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(10));
                None
            },
            |_| {},
        ))
    };

    let mut handles = Vec::new();
    for _ in 0..6 {
        let service = service.clone();
        handles.push(thread::spawn(move || service.start().unwrap()));
    }

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert_eq!(service.start_count(), 1);
}
