// Processor Port
// The caller-supplied work performed on every dequeued item

use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;

/// Item processor
///
/// Invoked exactly once per dequeued item by whichever worker pulled it.
/// There is no return contract: errors are the processor's own concern and
/// the queue never retries.
#[async_trait]
pub trait Processor<T>: Send + Sync {
    async fn process(&self, item: T);
}

/// Processor backed by an async closure, see [`processor_fn`]
pub struct FnProcessor<F, T> {
    f: F,
    _item: PhantomData<fn(T)>,
}

/// Wrap an async closure as a [`Processor`]
///
/// # Example
/// ```text
/// let proc = processor_fn(|n: u64| async move {
///     tracing::info!(n, "processed");
/// });
/// ```
pub fn processor_fn<T, F, Fut>(f: F) -> FnProcessor<F, T>
where
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    FnProcessor {
        f,
        _item: PhantomData,
    }
}

#[async_trait]
impl<T, F, Fut> Processor<T> for FnProcessor<F, T>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn process(&self, item: T) {
        (self.f)(item).await
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::watch;

    /// Mock processor behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Return immediately
        Noop,
        /// Sleep for the given duration per item
        Delay(Duration),
        /// Block until the gate is opened (see [`MockProcessor::open_gate`])
        Gated,
        /// Panic with message (for panic isolation testing)
        Panic(String),
    }

    /// Mock processor recording every item it saw
    pub struct MockProcessor<T> {
        behavior: MockBehavior,
        seen: Mutex<Vec<T>>,
        started: AtomicUsize,
        completed: AtomicUsize,
        gate_tx: watch::Sender<bool>,
        gate_rx: watch::Receiver<bool>,
    }

    impl<T> MockProcessor<T> {
        pub fn new(behavior: MockBehavior) -> Arc<Self> {
            let (gate_tx, gate_rx) = watch::channel(false);
            Arc::new(Self {
                behavior,
                seen: Mutex::new(Vec::new()),
                started: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
                gate_tx,
                gate_rx,
            })
        }
        pub fn new_noop() -> Arc<Self> {
            Self::new(MockBehavior::Noop)
        }
        pub fn new_gated() -> Arc<Self> {
            Self::new(MockBehavior::Gated)
        }
        /// Release every gated (current and future) call
        pub fn open_gate(&self) {
            let _ = self.gate_tx.send(true);
        }
        /// Block calls that start from now on again
        pub fn close_gate(&self) {
            let _ = self.gate_tx.send(false);
        }
        /// Items whose processing began
        pub fn started(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }
        /// Items whose processing ran to completion
        pub fn completed(&self) -> usize {
            self.completed.load(Ordering::SeqCst)
        }
    }

    impl<T: Clone> MockProcessor<T> {
        pub fn seen(&self) -> Vec<T> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl<T: Send + 'static> Processor<T> for MockProcessor<T> {
        async fn process(&self, item: T) {
            self.started.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                MockBehavior::Noop => {}
                MockBehavior::Delay(d) => tokio::time::sleep(*d).await,
                MockBehavior::Gated => {
                    let mut gate = self.gate_rx.clone();
                    let _ = gate.wait_for(|open| *open).await;
                }
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for panic isolation testing
                }
            }
            self.seen.lock().unwrap().push(item);
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
