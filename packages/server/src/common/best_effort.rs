//! Best-effort side effects.
//!
//! Some results are allowed to fail without failing the operation that
//! produced them: broadcasting a message that is already persisted, or one
//! step of a background round. Those call sites go through
//! [`BestEffort::best_effort`] so the outcome is logged with the operation
//! name instead of being dropped on the floor.

use std::fmt::Display;

use tracing::warn;

pub trait BestEffort<T> {
    /// Logs a failure under `operation` and converts the result to an option.
    fn best_effort(self, operation: &'static str) -> Option<T>;
}

impl<T, E: Display> BestEffort<T> for Result<T, E> {
    fn best_effort(self, operation: &'static str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(operation, error = %e, "best-effort operation failed");
                None
            }
        }
    }
}
