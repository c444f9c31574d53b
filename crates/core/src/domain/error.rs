// Domain Error Types

use thiserror::Error;

/// Configuration errors, fatal at initialization.
///
/// Recorded once by the initialization barrier and returned by every later
/// queue operation, hence `Clone`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No processor configured: a queue with nothing to do cannot run")]
    NoProcessor,

    #[error("Queue capacity must be greater than zero")]
    ZeroCapacity,

    #[error("Invalid setting {name}: {value}")]
    InvalidSetting { name: String, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
