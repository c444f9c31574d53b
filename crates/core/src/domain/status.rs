// Queue and Worker status model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall queue status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum QueueStatus {
    /// Not initialized yet (no operation has run)
    Inactive = 0,
    Active = 1,
    /// Buffer saturated while the pool is already at its maximum size
    Throttled = 2,
    /// Configuration error recorded at initialization
    Failed = 3,
    Closed = 4,
}

impl QueueStatus {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => QueueStatus::Active,
            2 => QueueStatus::Throttled,
            3 => QueueStatus::Failed,
            4 => QueueStatus::Closed,
            _ => QueueStatus::Inactive,
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueStatus::Inactive => write!(f, "inactive"),
            QueueStatus::Active => write!(f, "active"),
            QueueStatus::Throttled => write!(f, "throttled"),
            QueueStatus::Failed => write!(f, "failed"),
            QueueStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Worker slot state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum WorkerStatus {
    /// Slot allocated, never started
    Idle = 0,
    Active = 1,
    /// Parked, resumable without re-registration
    Sleeping = 2,
    /// Terminated, requires `Init` to run again
    Stopped = 3,
}

impl WorkerStatus {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => WorkerStatus::Active,
            2 => WorkerStatus::Sleeping,
            3 => WorkerStatus::Stopped,
            _ => WorkerStatus::Idle,
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Idle => write!(f, "IDLE"),
            WorkerStatus::Active => write!(f, "ACTIVE"),
            WorkerStatus::Sleeping => write!(f, "SLEEPING"),
            WorkerStatus::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Read-only view of a queue, for introspection and tooling only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub key: String,
    pub status: QueueStatus,
    pub capacity: usize,
    pub length: usize,
    pub workers_min: usize,
    pub workers_max: usize,
    pub workers_idle: usize,
    pub workers_active: usize,
    pub workers_sleep: usize,
    pub workers_stopped: usize,
    pub wakeup_factor: f32,
    pub sleep_factor: f32,
    pub heartbeat_ms: u64,
    pub started_at: Option<DateTime<Utc>>,
}

impl QueueSnapshot {
    /// Tally worker states into the idle/active/sleep/stopped counters
    pub(crate) fn count_workers(&mut self, statuses: impl IntoIterator<Item = WorkerStatus>) {
        for status in statuses {
            match status {
                WorkerStatus::Idle => self.workers_idle += 1,
                WorkerStatus::Active => self.workers_active += 1,
                WorkerStatus::Sleeping => self.workers_sleep += 1,
                WorkerStatus::Stopped => self.workers_stopped += 1,
            }
        }
    }
}
