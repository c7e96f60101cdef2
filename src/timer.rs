//! Monotonic timer abstraction used by every poll loop (spec.md §4.3,
//! §4.4, §4.5): "The core consumes from them only ... a monotonic timer
//! with start/expiry checks." Built on [`std::time::Instant`], which is
//! itself monotonic on every platform this crate targets.

use std::time::{Duration, Instant};

/// A one-shot deadline started at construction time.
pub struct Timer {
    deadline: Instant,
}

impl Timer {
    /// Start a timer that expires after `timeout_us` microseconds.
    pub fn start(timeout_us: u64) -> Self {
        Self {
            deadline: Instant::now() + Duration::from_micros(timeout_us),
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}
