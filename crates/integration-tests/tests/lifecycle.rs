//! Queue lifecycle
//!
//! Lazy one-time initialization, status reporting, and teardown.

use blqueue_core::port::metrics::mocks::CountingMetrics;
use blqueue_core::port::processor::mocks::MockProcessor;
use blqueue_core::port::MetricsWriter;
use blqueue_core::{Config, Decision, Queue, QueueError, QueueStatus, RebalanceOutcome};
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

async fn wait_until(what: &str, limit: Duration, mut cond: impl FnMut() -> bool) {
    let reached = tokio::time::timeout(limit, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for: {}", what);
}

/// Counts pool setups only
#[derive(Default)]
struct SetupCounter {
    setups: AtomicUsize,
}

impl MetricsWriter for SetupCounter {
    fn worker_setup(&self, _active: usize, _sleep: usize, _stop: usize) {
        self.setups.fetch_add(1, Ordering::SeqCst);
    }
}

/// Test 1: nothing runs before the first operation
#[tokio::test]
async fn test_inactive_until_first_use() {
    let queue = Queue::new(
        Config::<u32>::new(10)
            .key("lazy")
            .processor(MockProcessor::<u32>::new_noop()),
    );

    assert_eq!(queue.status(), QueueStatus::Inactive);
    assert_eq!(queue.active_workers(), 0);
    assert_eq!(queue.key(), Some("lazy"));

    let snapshot = queue.snapshot();
    assert_eq!(snapshot.status, QueueStatus::Inactive);
    assert_eq!(snapshot.workers_min, 1);
    assert!(snapshot.started_at.is_none());

    queue.init().await.unwrap();
    assert_eq!(queue.status(), QueueStatus::Active);
    assert_eq!(queue.active_workers(), 1);

    queue.shutdown().await.unwrap();
}

/// Test 2: concurrent first callers share one initialization
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_use_initializes_once() {
    let metrics = Arc::new(SetupCounter::default());
    let queue = Arc::new(Queue::new(
        Config::<u32>::new(64)
            .workers_min(2)
            .workers_max(4)
            .processor(MockProcessor::<u32>::new_noop())
            .metrics(metrics.clone()),
    ));

    let callers = (0..16u32).map(|i| {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.enqueue(i).await })
    });
    for result in join_all(callers).await {
        assert_eq!(result.unwrap(), Ok(true));
    }

    assert_eq!(metrics.setups.load(Ordering::SeqCst), 1);
    assert_eq!(queue.active_workers(), 2);

    queue.shutdown().await.unwrap();
}

/// Test 3: snapshot serializes every field
#[tokio::test]
async fn test_snapshot_json() {
    let queue = Queue::start(
        Config::<u32>::new(32)
            .key("orders")
            .workers_min(2)
            .workers_max(6)
            .wakeup_factor(0.9)
            .sleep_factor(0.2)
            .heartbeat(Duration::from_millis(50))
            .processor(MockProcessor::<u32>::new_noop()),
    )
    .await
    .unwrap();

    let json: serde_json::Value = serde_json::from_str(&queue.to_string()).unwrap();
    assert_eq!(json["key"], "orders");
    assert_eq!(json["status"], "active");
    assert_eq!(json["capacity"], 32);
    assert_eq!(json["length"], 0);
    assert_eq!(json["workers_min"], 2);
    assert_eq!(json["workers_max"], 6);
    assert_eq!(json["workers_idle"], 4);
    assert_eq!(json["workers_active"], 2);
    assert_eq!(json["workers_sleep"], 0);
    assert_eq!(json["workers_stopped"], 0);
    assert!((json["wakeup_factor"].as_f64().unwrap() - 0.9).abs() < 1e-6);
    assert!((json["sleep_factor"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    assert_eq!(json["heartbeat_ms"], 50);
    assert!(json["started_at"].is_string());

    queue.shutdown().await.unwrap();
}

/// Test 4: generated keys are unique per queue
#[tokio::test]
async fn test_generated_keys_are_unique() {
    let a = Queue::start(Config::<u32>::new(4).processor(MockProcessor::<u32>::new_noop()))
        .await
        .unwrap();
    let b = Queue::start(Config::<u32>::new(4).processor(MockProcessor::<u32>::new_noop()))
        .await
        .unwrap();

    let (ka, kb) = (a.key().unwrap().to_string(), b.key().unwrap().to_string());
    assert!(!ka.is_empty());
    assert_ne!(ka, kb);

    a.shutdown().await.unwrap();
    b.shutdown().await.unwrap();
}

/// Test 5: close drains, stops every worker and rejects later puts
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_stops_workers_and_rejects_puts() {
    let processor = MockProcessor::<u32>::new_noop();
    let metrics = Arc::new(CountingMetrics::new());
    let queue = Queue::new(
        Config::<u32>::new(10)
            .workers_min(2)
            .workers_max(3)
            .processor(processor.clone())
            .metrics(metrics.clone()),
    );

    for i in 0..5 {
        queue.enqueue(i).await.unwrap();
    }
    queue.close(Duration::from_secs(1)).await.unwrap();

    assert_eq!(processor.completed(), 5);
    assert_eq!(queue.status(), QueueStatus::Closed);
    assert_eq!(queue.active_workers(), 0);
    assert_eq!(queue.enqueue(5).await, Err(QueueError::Closed));
    assert_eq!(queue.rebalance().await, Ok(RebalanceOutcome::Skipped));

    let snapshot = queue.snapshot();
    assert_eq!(snapshot.workers_stopped, 2);
    assert_eq!(snapshot.workers_active, 0);
    assert_eq!(CountingMetrics::get(&metrics.stops), 2);
    assert_eq!(CountingMetrics::get(&metrics.forced_stops), 0);

    // idempotent
    tokio_test::assert_ok!(queue.close(Duration::from_secs(1)).await);
    assert_eq!(CountingMetrics::get(&metrics.closes), 1);
}

/// Test 6: a stuck item is abandoned once the grace period runs out
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_forces_stuck_worker() {
    let processor = MockProcessor::<u32>::new_gated();
    let metrics = Arc::new(CountingMetrics::new());
    let queue = Queue::new(
        Config::<u32>::new(4)
            .workers(1)
            .processor(processor.clone())
            .metrics(metrics.clone()),
    );

    queue.enqueue(1).await.unwrap();
    wait_until("item picked up", Duration::from_secs(2), || {
        processor.started() == 1
    })
    .await;

    let begun = Instant::now();
    queue.close(Duration::from_millis(50)).await.unwrap();
    assert!(begun.elapsed() < Duration::from_secs(2));

    assert_eq!(processor.completed(), 0);
    assert_eq!(CountingMetrics::get(&metrics.forced_stops), 1);
    assert_eq!(CountingMetrics::get(&metrics.stops), 1);
    assert_eq!(queue.status(), QueueStatus::Closed);
}

/// Test 7: producers blocked on a full buffer are released by close
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_releases_blocked_producer() {
    let processor = MockProcessor::<u32>::new_gated();
    let queue = Arc::new(Queue::new(
        Config::<u32>::new(1)
            .workers(1)
            .processor(processor.clone()),
    ));

    queue.enqueue(0).await.unwrap();
    wait_until("item picked up", Duration::from_secs(2), || {
        processor.started() == 1
    })
    .await;
    queue.enqueue(1).await.unwrap();

    let blocked = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.enqueue(2).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!blocked.is_finished());

    queue.close(Duration::from_millis(20)).await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(1), blocked)
        .await
        .expect("blocked producer must be released")
        .unwrap();
    let err = tokio_test::assert_err!(result);
    assert_eq!(err, QueueError::Closed);
    assert_eq!(queue.status(), QueueStatus::Closed);
}

/// Test 8: parked workers are stopped on close as well
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_stops_sleeping_workers() {
    let processor = MockProcessor::<u32>::new_gated();
    let metrics = Arc::new(CountingMetrics::new());
    let queue = Queue::new(
        Config::<u32>::new(10)
            .workers_min(1)
            .workers_max(2)
            .heartbeat(Duration::from_secs(3600))
            .processor(processor.clone())
            .metrics(metrics.clone()),
    );

    for i in 0..9 {
        queue.enqueue(i).await.unwrap();
    }
    assert_eq!(
        queue.rebalance().await,
        Ok(RebalanceOutcome::Applied(Decision::ScaleUp))
    );

    processor.open_gate();
    wait_until("buffer drained", Duration::from_secs(2), || {
        processor.completed() == 9
    })
    .await;
    assert_eq!(
        queue.rebalance().await,
        Ok(RebalanceOutcome::Applied(Decision::ScaleDown))
    );
    wait_until("scaled-down slot to park", Duration::from_secs(2), || {
        queue.snapshot().workers_sleep == 1
    })
    .await;

    queue.close(Duration::from_secs(1)).await.unwrap();

    let snapshot = queue.snapshot();
    assert_eq!(snapshot.workers_stopped, 2);
    assert_eq!(snapshot.workers_sleep, 0);
    assert_eq!(CountingMetrics::get(&metrics.stops), 2);
    assert_eq!(CountingMetrics::get(&metrics.closes), 1);
}
