// Queue/worker constants (no magic values)
use std::time::Duration;

/// In-flight enqueue attempts that force an immediate rebalance (1000)
pub const CONGESTION_LIMIT: i64 = 1000;

/// Default grace period granted to workers by `Queue::shutdown` (5s)
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Poll interval while waiting for the buffer to drain on close (1ms)
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How long a forced stop may take before the worker task is aborted (100ms)
pub const FORCED_STOP_TIMEOUT: Duration = Duration::from_millis(100);
