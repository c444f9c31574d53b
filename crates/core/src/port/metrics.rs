// Metrics Port
// Notified at worker lifecycle and queue traffic events.
// The queue behaves identically with or without a real sink attached.

use crate::domain::WorkerStatus;
use tracing::info;

/// Metrics sink
///
/// Every method defaults to a no-op so implementations only override the
/// events they care about.
pub trait MetricsWriter: Send + Sync {
    /// Slot setup at initialization: how many start active, parked, stopped
    fn worker_setup(&self, _active: usize, _sleep: usize, _stop: usize) {}
    fn worker_init(&self, _idx: usize) {}
    fn worker_sleep(&self, _idx: usize) {}
    fn worker_wakeup(&self, _idx: usize) {}
    /// `status` is the worker state at the moment the stop was observed
    fn worker_stop(&self, _idx: usize, _force: bool, _status: WorkerStatus) {}
    fn queue_put(&self) {}
    fn queue_pull(&self) {}
    fn queue_leak(&self) {}
    fn queue_close(&self) {}
}

/// Default sink, records nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsWriter for NoopMetrics {}

/// Sink that turns every event into a `tracing` event tagged with the queue key
#[derive(Debug, Clone)]
pub struct LogMetrics {
    queue: String,
}

impl LogMetrics {
    pub fn new(queue_key: impl Into<String>) -> Self {
        Self {
            queue: queue_key.into(),
        }
    }
}

impl MetricsWriter for LogMetrics {
    fn worker_setup(&self, active: usize, sleep: usize, stop: usize) {
        info!(queue = %self.queue, active, sleep, stop, "Workers set up");
    }

    fn worker_init(&self, idx: usize) {
        info!(queue = %self.queue, worker = idx, "Worker caught init signal");
    }

    fn worker_sleep(&self, idx: usize) {
        info!(queue = %self.queue, worker = idx, "Worker caught sleep signal");
    }

    fn worker_wakeup(&self, idx: usize) {
        info!(queue = %self.queue, worker = idx, "Worker caught wakeup signal");
    }

    fn worker_stop(&self, idx: usize, force: bool, status: WorkerStatus) {
        if force {
            info!(queue = %self.queue, worker = idx, status = %status, "Worker caught force stop signal");
        } else {
            info!(queue = %self.queue, worker = idx, "Worker caught stop signal");
        }
    }

    fn queue_put(&self) {
        tracing::trace!(queue = %self.queue, "Item entered the queue");
    }

    fn queue_pull(&self) {
        tracing::trace!(queue = %self.queue, "Item left the queue");
    }

    fn queue_leak(&self) {
        tracing::warn!(queue = %self.queue, "Queue leak");
    }

    fn queue_close(&self) {
        info!(queue = %self.queue, "Queue closed");
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Counts every event
    #[derive(Debug, Default)]
    pub struct CountingMetrics {
        pub setup: Mutex<Option<(usize, usize, usize)>>,
        pub inits: AtomicUsize,
        pub sleeps: AtomicUsize,
        pub wakeups: AtomicUsize,
        pub stops: AtomicUsize,
        pub forced_stops: AtomicUsize,
        pub puts: AtomicUsize,
        pub pulls: AtomicUsize,
        pub leaks: AtomicUsize,
        pub closes: AtomicUsize,
    }

    impl CountingMetrics {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get(counter: &AtomicUsize) -> usize {
            counter.load(Ordering::SeqCst)
        }
    }

    impl MetricsWriter for CountingMetrics {
        fn worker_setup(&self, active: usize, sleep: usize, stop: usize) {
            *self.setup.lock().unwrap() = Some((active, sleep, stop));
        }
        fn worker_init(&self, _idx: usize) {
            self.inits.fetch_add(1, Ordering::SeqCst);
        }
        fn worker_sleep(&self, _idx: usize) {
            self.sleeps.fetch_add(1, Ordering::SeqCst);
        }
        fn worker_wakeup(&self, _idx: usize) {
            self.wakeups.fetch_add(1, Ordering::SeqCst);
        }
        fn worker_stop(&self, _idx: usize, force: bool, _status: WorkerStatus) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if force {
                self.forced_stops.fetch_add(1, Ordering::SeqCst);
            }
        }
        fn queue_put(&self) {
            self.puts.fetch_add(1, Ordering::SeqCst);
        }
        fn queue_pull(&self) {
            self.pulls.fetch_add(1, Ordering::SeqCst);
        }
        fn queue_leak(&self) {
            self.leaks.fetch_add(1, Ordering::SeqCst);
        }
        fn queue_close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
