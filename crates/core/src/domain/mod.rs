// Domain Layer - Pure queue model, no runtime

pub mod config;
pub mod error;
pub mod signal;
pub mod status;

// Re-exports
pub use config::{QueueSettings, Settings};
pub use error::ConfigError;
pub use signal::Signal;
pub use status::{QueueSnapshot, QueueStatus, WorkerStatus};
