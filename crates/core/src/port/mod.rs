// Port Layer - Interfaces for external collaborators

pub mod leak_handler;
pub mod metrics;
pub mod processor;

// Re-exports
pub use leak_handler::{leak_fn, DropLeaked, FnLeakHandler, LeakHandler};
pub use metrics::{LogMetrics, MetricsWriter, NoopMetrics};
pub use processor::{processor_fn, FnProcessor, Processor};
