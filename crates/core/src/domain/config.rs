// Queue settings and their normalization rules

use crate::domain::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Occupancy at or above which the pool grows
pub const DEFAULT_WAKEUP_FACTOR: f32 = 0.75;

/// Occupancy at or below which the pool shrinks
pub const DEFAULT_SLEEP_FACTOR: f32 = 0.5;

/// Controller tick when none is configured (1ms)
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(1);

/// Environment variable prefix for [`QueueSettings::from_env`]
pub const ENV_PREFIX: &str = "BLQUEUE_";

/// Plain numeric queue settings, as supplied by a caller or the environment.
///
/// Zero / `None` means "use the default". Normalization into [`Settings`]
/// applies defaults and clamping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub key: Option<String>,
    pub capacity: usize,
    /// Shorthand for a fixed pool: fills `workers_min`/`workers_max` when unset
    pub workers: usize,
    pub workers_min: usize,
    pub workers_max: usize,
    pub wakeup_factor: Option<f32>,
    pub sleep_factor: Option<f32>,
    pub heartbeat_ms: u64,
}

/// Normalized, immutable settings of an initialized queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub key: String,
    pub capacity: usize,
    pub workers_min: usize,
    pub workers_max: usize,
    pub wakeup_factor: f32,
    pub sleep_factor: f32,
    pub heartbeat: Duration,
}

impl QueueSettings {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Load settings from `BLQUEUE_*` environment variables.
    ///
    /// Unset variables keep their defaults; malformed values are rejected.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        Ok(Self {
            key: get("KEY").filter(|k| !k.is_empty()),
            capacity: parse_var("CAPACITY", get("CAPACITY"))?.unwrap_or(0),
            workers: parse_var("WORKERS", get("WORKERS"))?.unwrap_or(0),
            workers_min: parse_var("WORKERS_MIN", get("WORKERS_MIN"))?.unwrap_or(0),
            workers_max: parse_var("WORKERS_MAX", get("WORKERS_MAX"))?.unwrap_or(0),
            wakeup_factor: parse_var("WAKEUP_FACTOR", get("WAKEUP_FACTOR"))?,
            sleep_factor: parse_var("SLEEP_FACTOR", get("SLEEP_FACTOR"))?,
            heartbeat_ms: parse_var("HEARTBEAT_MS", get("HEARTBEAT_MS"))?.unwrap_or(0),
        })
    }

    /// Apply defaults and clamping.
    ///
    /// Guarantees `1 <= workers_min <= workers_max` and
    /// `0 <= sleep_factor <= wakeup_factor <= 1`.
    pub fn normalize(&self) -> Result<Settings> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        let mut workers_min = self.workers_min;
        let mut workers_max = self.workers_max;
        if self.workers > 0 && workers_min == 0 {
            workers_min = self.workers;
        }
        if self.workers > 0 && workers_max == 0 {
            workers_max = self.workers;
        }
        if workers_min == 0 {
            workers_min = 1;
        }
        if workers_max < workers_min {
            workers_max = workers_min;
        }

        let wakeup = clamp_factor(self.wakeup_factor, DEFAULT_WAKEUP_FACTOR);
        let sleep = clamp_factor(self.sleep_factor, DEFAULT_SLEEP_FACTOR);
        // wakeup never drops below sleep
        let wakeup = wakeup.max(sleep);

        let heartbeat = if self.heartbeat_ms == 0 {
            DEFAULT_HEARTBEAT
        } else {
            Duration::from_millis(self.heartbeat_ms)
        };

        Ok(Settings {
            key: self
                .key
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            capacity: self.capacity,
            workers_min,
            workers_max,
            wakeup_factor: wakeup,
            sleep_factor: sleep,
            heartbeat,
        })
    }
}

fn clamp_factor(value: Option<f32>, default: f32) -> f32 {
    match value {
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => default,
    }
}

fn parse_var<V: std::str::FromStr>(name: &str, raw: Option<String>) -> Result<Option<V>> {
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .trim()
            .parse::<V>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidSetting {
                name: format!("{ENV_PREFIX}{name}"),
                value: s,
            }),
    }
}
