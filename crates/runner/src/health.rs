use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// The health of the [`crate::MelRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// The last steps succeeded, or fewer than the tolerated number failed.
    Healthy {
        /// The number of consecutive failed steps.
        consecutive_failures: u64,
    },
    /// The runner failed the same step at least the tolerated number of times.
    Stalled {
        /// The number of consecutive failed steps.
        consecutive_failures: u64,
    },
}

impl HealthStatus {
    /// Returns true if the runner is stalled.
    pub const fn is_stalled(&self) -> bool {
        matches!(self, Self::Stalled { .. })
    }
}

/// A shared counter of consecutive failed steps.
#[derive(Debug, Clone)]
pub struct RunnerHealth {
    failures: Arc<AtomicU64>,
    stall_tolerance: u64,
}

impl RunnerHealth {
    /// Returns a new [`RunnerHealth`] reporting a stall after `stall_tolerance` failures.
    pub fn new(stall_tolerance: u64) -> Self {
        Self { failures: Arc::new(AtomicU64::new(0)), stall_tolerance }
    }

    /// Returns the current status.
    pub fn status(&self) -> HealthStatus {
        let consecutive_failures = self.failures.load(Ordering::Relaxed);
        if self.stall_tolerance != 0 && consecutive_failures >= self.stall_tolerance {
            HealthStatus::Stalled { consecutive_failures }
        } else {
            HealthStatus::Healthy { consecutive_failures }
        }
    }

    /// Records a failed step and returns the number of consecutive failures.
    pub(crate) fn record_failure(&self) -> u64 {
        self.failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Resets the failure counter.
    pub(crate) fn record_success(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }
}
