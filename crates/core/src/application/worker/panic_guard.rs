// Panic isolation for caller-supplied code (processors, leak handlers)
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// Result of a panic-guarded call
#[derive(Debug, PartialEq, Eq)]
pub enum PanicGuardResult<T> {
    /// Call completed
    Success(T),
    /// Call panicked, with the extracted panic message
    Panicked(String),
}

/// Run a closure, turning a panic into [`PanicGuardResult::Panicked`].
///
/// Used on the producer path so a misbehaving leak handler cannot take the
/// producer down with it.
pub fn execute_guarded<F, T>(f: F) -> PanicGuardResult<T>
where
    F: FnOnce() -> T,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => PanicGuardResult::Success(result),
        Err(payload) => {
            let panic_msg = panic_message(payload.as_ref());
            error!(panic_msg = %panic_msg, "Guarded call panicked");
            PanicGuardResult::Panicked(panic_msg)
        }
    }
}

/// Extract a readable message from a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
