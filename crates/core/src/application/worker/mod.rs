// Worker - Slot state machine and observe loop

pub mod constants;
mod panic_guard;
mod signal_channel;

pub use panic_guard::{execute_guarded, panic_message, PanicGuardResult};
pub use signal_channel::{signal_channel, ReceivedSignal, SignalReceiver, SignalSender};

use crate::application::queue::stream::Stream;
use crate::domain::{Signal, WorkerStatus};
use crate::port::{MetricsWriter, Processor};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

/// Whether the observe loop keeps running after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

enum Event<T> {
    Signal(Option<ReceivedSignal>),
    Item(Option<T>),
}

enum InFlight {
    Signal(Option<ReceivedSignal>),
    Done(Result<(), JoinError>),
}

/// Processing task that is aborted when dropped, so abandoning the worker
/// task also abandons its in-flight item.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// One worker slot.
///
/// Created once per slot at queue initialization. Its observe loop is started
/// and stopped many times over the slot's lifetime, each run as a fresh task
/// bound to the same slot and signal channel.
pub struct Worker<T> {
    idx: usize,
    queue: String,
    status: AtomicU8,
    processor: Arc<dyn Processor<T>>,
    metrics: Arc<dyn MetricsWriter>,
}

impl<T: Send + 'static> Worker<T> {
    pub fn new(
        idx: usize,
        queue: impl Into<String>,
        processor: Arc<dyn Processor<T>>,
        metrics: Arc<dyn MetricsWriter>,
    ) -> Self {
        Self {
            idx,
            queue: queue.into(),
            status: AtomicU8::new(WorkerStatus::Idle as u8),
            processor,
            metrics,
        }
    }

    pub fn idx(&self) -> usize {
        self.idx
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: WorkerStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Observe loop.
    ///
    /// Waits for the activating command first, then competes for items with
    /// the sibling workers. A pending signal always wins over the next item.
    pub async fn observe(self: Arc<Self>, stream: Arc<Stream<T>>, signals: Arc<Mutex<SignalReceiver>>) {
        let mut signals = signals.lock().await;

        match signals.recv().await {
            Some(received) => {
                if self.observe_signal(received) == Flow::Exit {
                    return;
                }
            }
            None => return,
        }

        loop {
            let event = tokio::select! {
                biased;
                received = signals.recv() => Event::Signal(received),
                item = stream.pull() => Event::Item(item),
            };

            let flow = match event {
                Event::Signal(Some(received)) => self.observe_signal(received),
                Event::Signal(None) => {
                    debug!(queue = %self.queue, worker = self.idx, "Controller gone, worker exiting");
                    Flow::Exit
                }
                Event::Item(Some(item)) => {
                    self.metrics.queue_pull();
                    self.process(item, &mut signals).await
                }
                Event::Item(None) => {
                    info!(queue = %self.queue, worker = self.idx, "Stream closed, worker stopping");
                    self.apply(Signal::Stop { force: false })
                }
            };

            if flow == Flow::Exit {
                break;
            }
        }
    }

    /// Apply a signal, then release its sender
    fn observe_signal(&self, received: ReceivedSignal) -> Flow {
        let flow = self.apply(received.signal());
        received.ack();
        flow
    }

    /// Apply a signal observed between items
    fn apply(&self, signal: Signal) -> Flow {
        match signal {
            Signal::Init => {
                self.set_status(WorkerStatus::Active);
                self.metrics.worker_init(self.idx);
                debug!(queue = %self.queue, worker = self.idx, "Worker initialized");
                Flow::Continue
            }
            Signal::Resume => {
                self.set_status(WorkerStatus::Active);
                self.metrics.worker_wakeup(self.idx);
                debug!(queue = %self.queue, worker = self.idx, "Worker resumed");
                Flow::Continue
            }
            Signal::Sleep => {
                self.set_status(WorkerStatus::Sleeping);
                self.metrics.worker_sleep(self.idx);
                debug!(queue = %self.queue, worker = self.idx, "Worker sleeping");
                Flow::Exit
            }
            Signal::Stop { force } => {
                let previous = self.status();
                self.set_status(WorkerStatus::Stopped);
                self.metrics.worker_stop(self.idx, force, previous);
                debug!(queue = %self.queue, worker = self.idx, force, "Worker stopped");
                Flow::Exit
            }
        }
    }

    /// Process one item while still listening for control signals.
    ///
    /// Sleep and graceful stop let the item finish and take effect once it
    /// is done; forced stop abandons it. The loop keeps listening until the
    /// item completes, so a stop always reaches a draining worker.
    async fn process(&self, item: T, signals: &mut SignalReceiver) -> Flow {
        let processor = Arc::clone(&self.processor);
        let mut task = AbortOnDrop(tokio::spawn(async move { processor.process(item).await }));

        let mut after = Flow::Continue;
        let mut sleep_pending = false;
        // status at the moment a graceful stop was observed
        let mut stop_pending: Option<WorkerStatus> = None;
        let mut listening = true;

        loop {
            let event = tokio::select! {
                biased;
                received = signals.recv(), if listening => InFlight::Signal(received),
                done = &mut task.0 => InFlight::Done(done),
            };

            match event {
                InFlight::Done(result) => {
                    if let Err(e) = result {
                        self.report_failure(e);
                    }
                    if let Some(previous) = stop_pending {
                        self.set_status(WorkerStatus::Stopped);
                        self.metrics.worker_stop(self.idx, false, previous);
                        debug!(queue = %self.queue, worker = self.idx, "Worker stopped after its last item");
                    } else if sleep_pending {
                        self.set_status(WorkerStatus::Sleeping);
                        self.metrics.worker_sleep(self.idx);
                        debug!(queue = %self.queue, worker = self.idx, "Worker sleeping after its last item");
                    }
                    return after;
                }
                InFlight::Signal(None) => {
                    listening = false;
                    after = Flow::Exit;
                }
                InFlight::Signal(Some(received)) => {
                    match received.signal() {
                        Signal::Stop { force: true } => {
                            let previous = self.status();
                            task.0.abort();
                            self.set_status(WorkerStatus::Stopped);
                            self.metrics.worker_stop(self.idx, true, previous);
                            received.ack();
                            warn!(queue = %self.queue, worker = self.idx, "Forced stop, in-flight item abandoned");
                            return Flow::Exit;
                        }
                        Signal::Stop { force: false } => {
                            stop_pending.get_or_insert(self.status());
                            after = Flow::Exit;
                        }
                        Signal::Sleep => {
                            sleep_pending = true;
                            after = Flow::Exit;
                        }
                        Signal::Init | Signal::Resume => {}
                    }
                    received.ack();
                }
            }
        }
    }

    fn report_failure(&self, err: JoinError) {
        if err.is_panic() {
            let panic_msg = panic_message(err.into_panic().as_ref());
            error!(queue = %self.queue, worker = self.idx, panic_msg = %panic_msg, "Processor panicked");
        } else {
            warn!(queue = %self.queue, worker = self.idx, "Processing cancelled");
        }
    }
}
