// Central Error Type for the queue

use thiserror::Error;

/// Queue operation error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Initialization failed; the queue stays failed for its whole lifetime
    #[error("Configuration error: {0}")]
    Config(#[from] crate::domain::ConfigError),

    #[error("Queue is closed")]
    Closed,
}

/// Result type alias using QueueError
pub type Result<T> = std::result::Result<T, QueueError>;
