//! Restart-rate tracking.
//!
//! Every container that emits a `start` or `restart` event gets a [`TimeLog`].
//! When a container collects at least `threshold` triggers within `window`, a
//! violation is raised, after which further violations for the same container
//! are suppressed until `debounce` has passed.
//!
//! The tracker takes `&mut self` and is meant to be driven by a single
//! [`Dispatcher`](crate::dispatch::Dispatcher), so no locking is involved.
mod restart;
mod time_log;

use std::num::NonZeroUsize;
use std::time::Duration;

pub use restart::{RestartTracker, ViolationHandler};
pub use time_log::TimeLog;

/// Immutable restart policy of a [`RestartTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    window: Duration,
    threshold: NonZeroUsize,
    debounce: Duration,
}

impl TrackerConfig {
    /// Creates a policy that raises a violation once `threshold` restarts fall
    /// within `window`, at most once per `debounce` per container.
    pub fn new(window: Duration, threshold: NonZeroUsize, debounce: Duration) -> Self {
        Self {
            window,
            threshold,
            debounce,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn threshold(&self) -> NonZeroUsize {
        self.threshold
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }
}
