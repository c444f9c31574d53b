// blqueue core - balanced work queue
// No runtime wiring here: processors, leak handlers and metrics plug in via ports

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use application::{Config, Decision, Queue, RebalanceOutcome};
pub use domain::{QueueSettings, QueueSnapshot, QueueStatus, WorkerStatus};
pub use error::{QueueError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
