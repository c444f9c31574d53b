//! Rebalance policy - decides how the pool size reacts to buffer occupancy
//!
//! The policy itself is pure; `Queue` applies the decision under its
//! control lock. Rules are evaluated in order, first match wins:
//! 1. occupancy >= wakeup factor and room to grow: scale up
//! 2. occupancy <= sleep factor and room to shrink: scale down
//! 3. buffer saturated with nowhere to grow: throttled
//! 4. otherwise: steady

use crate::domain::Settings;

/// What one rebalance pass decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    ScaleUp,
    ScaleDown,
    Throttle,
    Steady,
}

/// Result of a rebalance trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceOutcome {
    /// Another pass was already running (or the queue is closed); trigger dropped
    Skipped,
    Applied(Decision),
    /// Scaling decided but not possible this pass (e.g. every free slot is
    /// still finishing the item it had when put to sleep)
    Deferred(Decision),
}

/// Decide the next pool action.
///
/// Never yields `ScaleUp` at `active >= workers_max` nor `ScaleDown` at
/// `active <= workers_min`.
pub fn decide(rate: f32, active: usize, settings: &Settings) -> Decision {
    if rate >= settings.wakeup_factor && active < settings.workers_max {
        Decision::ScaleUp
    } else if rate <= settings.sleep_factor && active > settings.workers_min {
        Decision::ScaleDown
    } else if rate >= 1.0 {
        Decision::Throttle
    } else {
        Decision::Steady
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings(min: usize, max: usize, wakeup: f32, sleep: f32) -> Settings {
        Settings {
            key: "test".to_string(),
            capacity: 100,
            workers_min: min,
            workers_max: max,
            wakeup_factor: wakeup,
            sleep_factor: sleep,
            heartbeat: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_scale_up_above_wakeup() {
        let s = settings(1, 4, 0.75, 0.5);
        assert_eq!(decide(0.8, 1, &s), Decision::ScaleUp);
        assert_eq!(decide(0.75, 3, &s), Decision::ScaleUp);
    }

    #[test]
    fn test_scale_down_below_sleep() {
        let s = settings(1, 4, 0.75, 0.5);
        assert_eq!(decide(0.1, 2, &s), Decision::ScaleDown);
        assert_eq!(decide(0.5, 4, &s), Decision::ScaleDown);
    }

    #[test]
    fn test_bounds_prevent_scaling() {
        let s = settings(1, 4, 0.75, 0.5);
        assert_eq!(decide(0.9, 4, &s), Decision::Steady);
        assert_eq!(decide(0.0, 1, &s), Decision::Steady);
    }

    #[test]
    fn test_throttle_when_saturated_at_max() {
        let s = settings(1, 4, 0.75, 0.5);
        assert_eq!(decide(1.0, 4, &s), Decision::Throttle);
        // saturated but still room to grow
        assert_eq!(decide(1.0, 2, &s), Decision::ScaleUp);
    }

    #[test]
    fn test_between_thresholds_is_steady() {
        let s = settings(1, 4, 0.75, 0.5);
        assert_eq!(decide(0.6, 2, &s), Decision::Steady);
    }

    #[test]
    fn test_equal_factors_prefer_scale_up() {
        let s = settings(1, 4, 0.5, 0.5);
        assert_eq!(decide(0.5, 2, &s), Decision::ScaleUp);
        assert_eq!(decide(0.5, 4, &s), Decision::ScaleDown);
    }

    #[test]
    fn test_active_count_stays_in_bounds() {
        // Deterministic walk over many occupancy samples and configurations
        let configs = [
            settings(1, 1, 0.75, 0.5),
            settings(1, 4, 0.75, 0.5),
            settings(2, 8, 0.9, 0.1),
            settings(3, 5, 0.5, 0.5),
            settings(1, 3, 1.0, 0.0),
        ];

        for s in &configs {
            let mut active = s.workers_min;
            let mut seed: u32 = 0x9E37_79B9;
            for _ in 0..10_000 {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                let rate = (seed % 101) as f32 / 100.0;

                match decide(rate, active, s) {
                    Decision::ScaleUp => active += 1,
                    Decision::ScaleDown => active -= 1,
                    Decision::Throttle | Decision::Steady => {}
                }
                assert!(
                    (s.workers_min..=s.workers_max).contains(&active),
                    "active {} escaped [{}, {}]",
                    active,
                    s.workers_min,
                    s.workers_max
                );
            }
        }
    }
}
