// Shared buffer between producers and workers

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;

/// Bounded FIFO shared by all producers and all active workers.
///
/// Workers take turns on the receiving half; the current length is read
/// from the sending half without any lock.
pub struct Stream<T> {
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
}

impl<T> Stream<T> {
    /// # Panics
    /// Panics when `capacity` is zero; settings normalization rejects that first.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Items currently buffered
    pub fn len(&self) -> usize {
        self.tx.max_capacity().saturating_sub(self.tx.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Occupancy rate: length / capacity, in [0, 1]
    pub fn occupancy(&self) -> f32 {
        (self.len() as f32 / self.capacity() as f32).clamp(0.0, 1.0)
    }

    /// Wait for space and enqueue. Gives the item back if the stream is closed.
    pub async fn push(&self, item: T) -> Result<(), T> {
        self.tx.send(item).await.map_err(|e| e.0)
    }

    /// Enqueue without waiting
    pub fn try_push(&self, item: T) -> Result<(), TrySendError<T>> {
        self.tx.try_send(item)
    }

    /// Next item, or None once the stream is closed and drained
    pub async fn pull(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    /// Reject further pushes and discard whatever is still buffered.
    ///
    /// Returns the number of discarded items.
    pub async fn close(&self) -> usize {
        let mut rx = self.rx.lock().await;
        rx.close();
        let mut discarded = 0;
        while rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}
