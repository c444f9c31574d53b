//! Queue - coordinator of the buffer, the worker slots and the controller
//!
//! Producers call [`Queue::enqueue`]; workers drain the shared stream; the
//! rebalance controller grows or shrinks the pool, triggered by the heartbeat
//! and by the congestion counter on the enqueue path.

mod config;
pub mod heartbeat;
pub mod stream;

pub use config::Config;

use crate::application::rebalance::{decide, Decision, RebalanceOutcome};
use crate::application::worker::constants::{
    CONGESTION_LIMIT, DEFAULT_CLOSE_GRACE, DRAIN_POLL_INTERVAL, FORCED_STOP_TIMEOUT,
};
use crate::application::worker::{
    execute_guarded, signal_channel, PanicGuardResult, SignalReceiver, SignalSender, Worker,
};
use crate::domain::{
    ConfigError, QueueSnapshot, QueueStatus, Settings, Signal, WorkerStatus,
};
use crate::domain::config::{DEFAULT_HEARTBEAT, DEFAULT_SLEEP_FACTOR, DEFAULT_WAKEUP_FACTOR};
use crate::error::{QueueError, Result};
use crate::port::{LeakHandler, MetricsWriter, NoopMetrics};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use stream::Stream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

/// Balanced work queue
///
/// Cheap to construct; the first operation initializes it exactly once,
/// concurrent first callers all wait for that same initialization.
pub struct Queue<T> {
    config: Config<T>,
    core: OnceCell<std::result::Result<Arc<Core<T>>, ConfigError>>,
}

/// State guarded by the control lock: only the controller touches it
struct Control {
    /// Active slots in activation order, most recent last
    order: Vec<usize>,
    /// Latest observe task per slot; a slot is reusable once its task is done
    tasks: Vec<Option<JoinHandle<()>>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl Control {
    fn is_draining(&self, idx: usize) -> bool {
        self.tasks[idx].as_ref().is_some_and(|task| !task.is_finished())
    }
}

/// Initialized queue state
struct Core<T> {
    settings: Settings,
    stream: Arc<Stream<T>>,
    workers: Vec<Arc<Worker<T>>>,
    signals: Vec<SignalSender>,
    receivers: Vec<Arc<Mutex<SignalReceiver>>>,
    control: Mutex<Control>,
    /// Lock-free mirror of the `Control::order` length for readers
    active: AtomicUsize,
    status: AtomicU8,
    congestion: AtomicI64,
    passes: AtomicU64,
    closed: AtomicBool,
    leak_handler: Option<Arc<dyn LeakHandler<T>>>,
    metrics: Arc<dyn MetricsWriter>,
    started_at: DateTime<Utc>,
}

/// Tracks one in-flight enqueue attempt on the congestion counter
struct InFlight<'a> {
    counter: &'a AtomicI64,
}

impl<'a> InFlight<'a> {
    /// Register the attempt, returning the guard and the new in-flight count
    fn enter(counter: &'a AtomicI64) -> (Self, i64) {
        let count = counter.fetch_add(1, Ordering::AcqRel) + 1;
        (Self { counter }, count)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        // floor at zero: the controller resets the counter while attempts are in flight
        let _ = self
            .counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some((v - 1).max(0)));
    }
}

impl<T: Send + 'static> Queue<T> {
    pub fn new(config: Config<T>) -> Self {
        Self {
            config,
            core: OnceCell::new(),
        }
    }

    /// Construct and initialize immediately
    pub async fn start(config: Config<T>) -> Result<Self> {
        let queue = Self::new(config);
        queue.init().await?;
        Ok(queue)
    }

    /// Run initialization if it has not happened yet
    pub async fn init(&self) -> Result<()> {
        self.core().await.map(|_| ())
    }

    async fn core(&self) -> Result<&Arc<Core<T>>> {
        self.core
            .get_or_init(|| self.initialize())
            .await
            .as_ref()
            .map_err(|e| QueueError::Config(e.clone()))
    }

    async fn initialize(&self) -> std::result::Result<Arc<Core<T>>, ConfigError> {
        let Some(processor) = self.config.processor.clone() else {
            error!("Queue initialization failed: no processor configured");
            return Err(ConfigError::NoProcessor);
        };
        let settings = self.config.settings.normalize().map_err(|e| {
            error!(error = %e, "Queue initialization failed");
            e
        })?;

        let metrics = self
            .config
            .metrics
            .clone()
            .unwrap_or_else(|| Arc::new(NoopMetrics));

        let max = settings.workers_max;
        let mut workers = Vec::with_capacity(max);
        let mut signals = Vec::with_capacity(max);
        let mut receivers = Vec::with_capacity(max);
        for idx in 0..max {
            workers.push(Arc::new(Worker::new(
                idx,
                settings.key.clone(),
                Arc::clone(&processor),
                Arc::clone(&metrics),
            )));
            let (tx, rx) = signal_channel();
            signals.push(tx);
            receivers.push(Arc::new(Mutex::new(rx)));
        }

        let core = Arc::new(Core {
            stream: Arc::new(Stream::new(settings.capacity)),
            workers,
            signals,
            receivers,
            control: Mutex::new(Control {
                order: Vec::with_capacity(max),
                tasks: (0..max).map(|_| None).collect(),
                heartbeat: None,
            }),
            active: AtomicUsize::new(0),
            status: AtomicU8::new(QueueStatus::Inactive as u8),
            congestion: AtomicI64::new(0),
            passes: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            leak_handler: self.config.leak_handler.clone(),
            metrics,
            started_at: Utc::now(),
            settings,
        });

        core.metrics.worker_setup(
            core.settings.workers_min,
            core.settings.workers_max - core.settings.workers_min,
            0,
        );

        let mut control = core.control.lock().await;
        for _ in 0..core.settings.workers_min {
            core.wake_next(&mut control).await;
        }
        core.set_status(QueueStatus::Active);

        let weak: Weak<Core<T>> = Arc::downgrade(&core);
        control.heartbeat = Some(heartbeat::spawn(core.settings.heartbeat, move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(core) if !core.closed.load(Ordering::Acquire) => {
                        core.rebalance().await;
                        true
                    }
                    _ => false,
                }
            }
        }));
        drop(control);

        info!(
            queue = %core.settings.key,
            capacity = core.settings.capacity,
            workers_min = core.settings.workers_min,
            workers_max = core.settings.workers_max,
            wakeup_factor = core.settings.wakeup_factor,
            sleep_factor = core.settings.sleep_factor,
            heartbeat_ms = core.settings.heartbeat.as_millis() as u64,
            leaky = core.leak_handler.is_some(),
            "Queue initialized"
        );

        Ok(core)
    }

    /// Enqueue an item.
    ///
    /// Blocking mode waits for buffer space and returns `Ok(true)`. Leaky mode
    /// never waits: a full buffer hands the item to the leak handler and
    /// returns `Ok(false)`.
    ///
    /// # Errors
    /// - `QueueError::Config` if initialization failed
    /// - `QueueError::Closed` once the queue is closed
    pub async fn enqueue(&self, item: T) -> Result<bool> {
        self.core().await?.enqueue(item).await
    }

    /// Alias of [`enqueue`](Self::enqueue)
    pub async fn put(&self, item: T) -> Result<bool> {
        self.enqueue(item).await
    }

    /// Trigger a rebalance pass now (same path as heartbeat and congestion)
    pub async fn rebalance(&self) -> Result<RebalanceOutcome> {
        Ok(self.core().await?.rebalance().await)
    }

    /// Stop all workers and close the buffer.
    ///
    /// Workers get `grace` to drain the buffer and finish their in-flight
    /// items; whatever is still running afterwards is stopped by force.
    /// Items left in the buffer are discarded. Idempotent.
    pub async fn close(&self, grace: Duration) -> Result<()> {
        self.core().await?.close(grace).await;
        Ok(())
    }

    /// [`close`](Self::close) with the default grace period
    pub async fn shutdown(&self) -> Result<()> {
        self.close(DEFAULT_CLOSE_GRACE).await
    }

    pub fn status(&self) -> QueueStatus {
        match self.core.get() {
            None => QueueStatus::Inactive,
            Some(Err(_)) => QueueStatus::Failed,
            Some(Ok(core)) => core.status(),
        }
    }

    /// Initialization error, if any
    pub fn error(&self) -> Option<&ConfigError> {
        self.core.get().and_then(|r| r.as_ref().err())
    }

    pub fn key(&self) -> Option<&str> {
        match self.core.get() {
            Some(Ok(core)) => Some(core.settings.key.as_str()),
            _ => self.config.settings.key.as_deref(),
        }
    }

    pub fn active_workers(&self) -> usize {
        match self.core.get() {
            Some(Ok(core)) => core.active.load(Ordering::Acquire),
            _ => 0,
        }
    }

    /// Items currently buffered
    pub fn len(&self) -> usize {
        match self.core.get() {
            Some(Ok(core)) => core.stream.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of executed (not skipped) rebalance passes
    pub fn rebalance_count(&self) -> u64 {
        match self.core.get() {
            Some(Ok(core)) => core.passes.load(Ordering::Acquire),
            _ => 0,
        }
    }

    pub fn is_leaky(&self) -> bool {
        self.config.is_leaky()
    }

    /// Read-only status snapshot
    pub fn snapshot(&self) -> QueueSnapshot {
        match self.core.get() {
            Some(Ok(core)) => core.snapshot(),
            _ => self.pending_snapshot(),
        }
    }

    /// View of a queue that is not running (uninitialized or failed)
    fn pending_snapshot(&self) -> QueueSnapshot {
        let s = &self.config.settings;
        let or_workers = |n: usize| if n == 0 { s.workers } else { n };
        let workers_min = or_workers(s.workers_min).max(1);
        QueueSnapshot {
            key: s.key.clone().unwrap_or_default(),
            status: self.status(),
            capacity: s.capacity,
            length: 0,
            workers_min,
            workers_max: or_workers(s.workers_max).max(workers_min),
            workers_idle: 0,
            workers_active: 0,
            workers_sleep: 0,
            workers_stopped: 0,
            wakeup_factor: s.wakeup_factor.unwrap_or(DEFAULT_WAKEUP_FACTOR),
            sleep_factor: s.sleep_factor.unwrap_or(DEFAULT_SLEEP_FACTOR),
            heartbeat_ms: match s.heartbeat_ms {
                0 => DEFAULT_HEARTBEAT.as_millis() as u64,
                ms => ms,
            },
            started_at: None,
        }
    }
}

impl<T: Send + 'static> fmt::Display for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.snapshot()).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl<T: Send + 'static> Core<T> {
    fn status(&self) -> QueueStatus {
        QueueStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: QueueStatus) {
        let previous = self.status.swap(status as u8, Ordering::AcqRel);
        if status == QueueStatus::Throttled && previous != QueueStatus::Throttled as u8 {
            warn!(queue = %self.settings.key, "Queue throttled: buffer saturated at max workers");
        }
    }

    async fn enqueue(&self, item: T) -> Result<bool> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }

        let (_in_flight, count) = InFlight::enter(&self.congestion);
        if count >= CONGESTION_LIMIT {
            debug!(queue = %self.settings.key, in_flight = count, "Congestion limit reached, rebalancing");
            self.rebalance().await;
        }

        match &self.leak_handler {
            None => match self.stream.push(item).await {
                Ok(()) => {
                    self.metrics.queue_put();
                    Ok(true)
                }
                Err(_) => Err(QueueError::Closed),
            },
            Some(handler) => match self.stream.try_push(item) {
                Ok(()) => {
                    self.metrics.queue_put();
                    Ok(true)
                }
                Err(TrySendError::Full(item)) => {
                    if let PanicGuardResult::Panicked(msg) = execute_guarded(|| handler.catch(item)) {
                        error!(queue = %self.settings.key, panic_msg = %msg, "Leak handler panicked");
                    }
                    self.metrics.queue_leak();
                    Ok(false)
                }
                Err(TrySendError::Closed(_)) => Err(QueueError::Closed),
            },
        }
    }

    /// One controller pass. Dropped (not queued) while another pass runs.
    async fn rebalance(&self) -> RebalanceOutcome {
        let Ok(mut control) = self.control.try_lock() else {
            return RebalanceOutcome::Skipped;
        };
        if self.closed.load(Ordering::Acquire) {
            return RebalanceOutcome::Skipped;
        }

        // the breach that may have triggered this pass is about to be handled
        self.congestion.store(0, Ordering::Release);
        self.passes.fetch_add(1, Ordering::AcqRel);

        let rate = self.stream.occupancy();
        let decision = decide(rate, control.order.len(), &self.settings);
        debug!(
            queue = %self.settings.key,
            rate,
            active = control.order.len(),
            decision = ?decision,
            "Rebalance pass"
        );

        let applied = match decision {
            Decision::ScaleUp => self.wake_next(&mut control).await,
            Decision::ScaleDown => self.sleep_last(&mut control).await,
            Decision::Throttle | Decision::Steady => true,
        };
        self.set_status(if decision == Decision::Throttle {
            QueueStatus::Throttled
        } else {
            QueueStatus::Active
        });

        if applied {
            RebalanceOutcome::Applied(decision)
        } else {
            RebalanceOutcome::Deferred(decision)
        }
    }

    fn spawn_worker(&self, idx: usize) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(&self.workers[idx]).observe(
            Arc::clone(&self.stream),
            Arc::clone(&self.receivers[idx]),
        ))
    }

    /// Activate the lowest free slot. Returns false when none can be activated.
    ///
    /// A slot put to sleep mid-item stays draining until that item is done;
    /// it is not free before then, so no signal is ever sent that its current
    /// task cannot observe.
    async fn wake_next(&self, control: &mut Control) -> bool {
        if control.order.len() >= self.settings.workers_max {
            return false;
        }
        let free = (0..self.settings.workers_max)
            .find(|idx| !control.order.contains(idx) && !control.is_draining(*idx));
        let Some(idx) = free else {
            debug!(queue = %self.settings.key, "Every free slot is still draining, scale-up deferred");
            return false;
        };

        let signal = match self.workers[idx].status() {
            WorkerStatus::Idle | WorkerStatus::Stopped => Signal::Init,
            WorkerStatus::Sleeping => Signal::Resume,
            WorkerStatus::Active => {
                error!(queue = %self.settings.key, worker = idx, "Inactive slot reports active");
                return false;
            }
        };

        control.tasks[idx] = Some(self.spawn_worker(idx));
        if !self.signals[idx].send(signal).await {
            error!(queue = %self.settings.key, worker = idx, signal = %signal, "Worker did not observe signal");
            return false;
        }

        control.order.push(idx);
        self.active.store(control.order.len(), Ordering::Release);
        info!(queue = %self.settings.key, worker = idx, active = control.order.len(), "Worker woken up");
        true
    }

    /// Park the most recently activated slot. Returns false at the lower bound.
    async fn sleep_last(&self, control: &mut Control) -> bool {
        if control.order.len() <= self.settings.workers_min {
            return false;
        }
        let Some(&idx) = control.order.last() else {
            return false;
        };

        if !self.signals[idx].send(Signal::Sleep).await {
            error!(queue = %self.settings.key, worker = idx, "Worker did not observe sleep signal");
            return false;
        }

        control.order.pop();
        self.active.store(control.order.len(), Ordering::Release);
        info!(queue = %self.settings.key, worker = idx, active = control.order.len(), "Worker put to sleep");
        true
    }

    async fn close(&self, grace: Duration) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let deadline = Instant::now() + grace;

        // a pass in progress only waits on acks from listening workers
        let Ok(mut control) = timeout(grace, self.control.lock()).await else {
            error!(queue = %self.settings.key, "Controller still busy after grace period, workers left running");
            self.set_status(QueueStatus::Closed);
            return;
        };
        if let Some(heartbeat) = control.heartbeat.take() {
            heartbeat.abort();
        }
        info!(queue = %self.settings.key, buffered = self.stream.len(), "Closing queue");

        while !self.stream.is_empty() && Instant::now() < deadline {
            sleep(DRAIN_POLL_INTERVAL).await;
        }

        let order = std::mem::take(&mut control.order);
        let mut stopping = Vec::with_capacity(self.settings.workers_max);
        for &idx in order.iter().rev() {
            self.send_stop(idx, deadline).await;
            if let Some(task) = control.tasks[idx].take() {
                stopping.push(self.finish_stop(idx, task, deadline));
            }
        }

        // draining and parked slots are stopped through their channel as well
        for idx in 0..self.settings.workers_max {
            if order.contains(&idx) {
                continue;
            }
            let sleeping = self.workers[idx].status() == WorkerStatus::Sleeping;
            let task = match control.tasks[idx].take() {
                Some(task) if sleeping => {
                    // parked as its last item returned, the old loop is on its way out
                    let _ = timeout(deadline.saturating_duration_since(Instant::now()), task).await;
                    self.spawn_worker(idx)
                }
                Some(task) if !task.is_finished() => task,
                None if sleeping => self.spawn_worker(idx),
                _ => continue,
            };
            self.send_stop(idx, deadline).await;
            stopping.push(self.finish_stop(idx, task, deadline));
        }
        join_all(stopping).await;

        self.active.store(0, Ordering::Release);

        let discarded = self.stream.close().await;
        if discarded > 0 {
            warn!(queue = %self.settings.key, discarded, "Discarded buffered items on close");
        }

        self.set_status(QueueStatus::Closed);
        self.metrics.queue_close();
        info!(queue = %self.settings.key, "Queue closed");
    }

    /// Graceful stop, delivered within what is left of the grace period
    async fn send_stop(&self, idx: usize, deadline: Instant) {
        let _ = timeout(
            deadline.saturating_duration_since(Instant::now()),
            self.signals[idx].send(Signal::Stop { force: false }),
        )
        .await;
    }

    /// Wait for a stopping worker task; force it once the deadline passes
    async fn finish_stop(&self, idx: usize, mut task: JoinHandle<()>, deadline: Instant) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if timeout(remaining, &mut task).await.is_ok() {
            return;
        }

        warn!(queue = %self.settings.key, worker = idx, "Grace period expired, forcing stop");
        let _ = timeout(
            FORCED_STOP_TIMEOUT,
            self.signals[idx].send(Signal::Stop { force: true }),
        )
        .await;
        if timeout(FORCED_STOP_TIMEOUT, &mut task).await.is_err() {
            task.abort();
        }
    }

    fn snapshot(&self) -> QueueSnapshot {
        let mut snapshot = QueueSnapshot {
            key: self.settings.key.clone(),
            status: self.status(),
            capacity: self.settings.capacity,
            length: self.stream.len(),
            workers_min: self.settings.workers_min,
            workers_max: self.settings.workers_max,
            workers_idle: 0,
            workers_active: 0,
            workers_sleep: 0,
            workers_stopped: 0,
            wakeup_factor: self.settings.wakeup_factor,
            sleep_factor: self.settings.sleep_factor,
            heartbeat_ms: self.settings.heartbeat.as_millis() as u64,
            started_at: Some(self.started_at),
        };
        snapshot.count_workers(self.workers.iter().map(|w| w.status()));
        snapshot
    }
}
