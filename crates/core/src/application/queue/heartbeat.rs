// Heartbeat - periodic rebalance trigger

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Spawn the heartbeat task.
///
/// `beat` runs once per `period` and returns false once its target is gone
/// (dropped or closed), which ends the task. The owner may also abort the
/// handle, but only while no beat is in progress.
pub fn spawn<F, Fut>(period: Duration, beat: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    tokio::spawn(run(period, beat))
}

/// Beat loop. Missed ticks are delayed rather than bursted, so a slow pass
/// never causes a volley of catch-up passes.
pub async fn run<F, Fut>(period: Duration, mut beat: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    tick.tick().await;

    let mut beats: u64 = 0;
    loop {
        tick.tick().await;
        if !beat().await {
            break;
        }
        beats += 1;
    }
    debug!(beats, "Heartbeat stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_stops_when_target_gone() {
        let beats = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&beats);

        let handle = spawn(Duration::from_millis(1), move || {
            let counter = Arc::clone(&counter);
            async move { counter.fetch_add(1, Ordering::SeqCst) + 1 < 5 }
        });

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("heartbeat should stop")
            .unwrap();
        assert_eq!(beats.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_first_beat_waits_one_period() {
        let beats = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&beats);

        let handle = spawn(Duration::from_secs(3600), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(beats.load(Ordering::SeqCst), 0);

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_beat_does_not_burst() {
        let beats = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&beats);

        let handle = spawn(Duration::from_millis(1), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                true
            }
        });

        tokio::time::sleep(Duration::from_millis(110)).await;
        handle.abort();
        // one beat per 20ms at most, never a catch-up volley
        assert!(beats.load(Ordering::SeqCst) <= 7);
    }
}
