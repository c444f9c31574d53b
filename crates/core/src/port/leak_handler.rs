// Leak Handler Port (overflow policy)

use std::marker::PhantomData;

/// Receives items that did not fit into a full buffer.
///
/// Presence of a leak handler switches the queue into leaky (non-blocking)
/// mode. Called synchronously on the producer's path, so it must not block.
pub trait LeakHandler<T>: Send + Sync {
    fn catch(&self, item: T);
}

/// Leak handler backed by a closure, see [`leak_fn`]
pub struct FnLeakHandler<F, T> {
    f: F,
    _item: PhantomData<fn(T)>,
}

/// Wrap a closure as a [`LeakHandler`]
pub fn leak_fn<T, F>(f: F) -> FnLeakHandler<F, T>
where
    F: Fn(T) + Send + Sync,
{
    FnLeakHandler {
        f,
        _item: PhantomData,
    }
}

impl<T, F> LeakHandler<T> for FnLeakHandler<F, T>
where
    F: Fn(T) + Send + Sync,
{
    fn catch(&self, item: T) {
        (self.f)(item)
    }
}

/// Silently discards leaked items
pub struct DropLeaked;

impl<T> LeakHandler<T> for DropLeaked {
    fn catch(&self, _item: T) {}
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Collects every leaked item
    pub struct MockLeakHandler<T> {
        caught: Mutex<Vec<T>>,
    }

    impl<T> MockLeakHandler<T> {
        pub fn new() -> Self {
            Self {
                caught: Mutex::new(Vec::new()),
            }
        }
        pub fn count(&self) -> usize {
            self.caught.lock().unwrap().len()
        }
    }

    impl<T> Default for MockLeakHandler<T> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<T: Clone> MockLeakHandler<T> {
        pub fn caught(&self) -> Vec<T> {
            self.caught.lock().unwrap().clone()
        }
    }

    impl<T: Send> LeakHandler<T> for MockLeakHandler<T> {
        fn catch(&self, item: T) {
            self.caught.lock().unwrap().push(item);
        }
    }
}
