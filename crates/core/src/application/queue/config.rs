// Queue configuration: settings plus the pluggable collaborators

use crate::domain::QueueSettings;
use crate::port::{LeakHandler, MetricsWriter, Processor};
use std::sync::Arc;
use std::time::Duration;

/// Queue configuration (builder style)
///
/// # Example
/// ```text
/// let config = Config::new(100)
///     .key("orders")
///     .workers_min(1)
///     .workers_max(4)
///     .processor(Arc::new(processor_fn(|order: Order| async move { ship(order).await })));
/// ```
pub struct Config<T> {
    pub(crate) settings: QueueSettings,
    pub(crate) processor: Option<Arc<dyn Processor<T>>>,
    pub(crate) leak_handler: Option<Arc<dyn LeakHandler<T>>>,
    pub(crate) metrics: Option<Arc<dyn MetricsWriter>>,
}

impl<T> Config<T> {
    pub fn new(capacity: usize) -> Self {
        Self::from_settings(QueueSettings::new(capacity))
    }

    pub fn from_settings(settings: QueueSettings) -> Self {
        Self {
            settings,
            processor: None,
            leak_handler: None,
            metrics: None,
        }
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.settings.key = Some(key.into());
        self
    }

    /// Fixed pool size (both bounds, unless set explicitly)
    pub fn workers(mut self, workers: usize) -> Self {
        self.settings.workers = workers;
        self
    }

    pub fn workers_min(mut self, workers: usize) -> Self {
        self.settings.workers_min = workers;
        self
    }

    pub fn workers_max(mut self, workers: usize) -> Self {
        self.settings.workers_max = workers;
        self
    }

    pub fn wakeup_factor(mut self, factor: f32) -> Self {
        self.settings.wakeup_factor = Some(factor);
        self
    }

    pub fn sleep_factor(mut self, factor: f32) -> Self {
        self.settings.sleep_factor = Some(factor);
        self
    }

    /// Rebalance period, millisecond granularity
    pub fn heartbeat(mut self, period: Duration) -> Self {
        self.settings.heartbeat_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn processor(mut self, processor: Arc<dyn Processor<T>>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Switches the queue to leaky (non-blocking) mode
    pub fn leak_handler(mut self, handler: Arc<dyn LeakHandler<T>>) -> Self {
        self.leak_handler = Some(handler);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsWriter>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn is_leaky(&self) -> bool {
        self.leak_handler.is_some()
    }
}
