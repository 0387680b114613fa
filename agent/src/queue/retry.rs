//! Per-task retry bookkeeping

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Retry state for a task that failed at least once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryInfo {
    /// Failed attempts so far
    pub count: u32,

    /// Earliest time the task may run again
    pub next_retry_at: DateTime<Utc>,
}

impl RetryInfo {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            next_retry_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_retry_at
    }
}

/// Linear backoff: `count * step`.
pub fn linear_backoff(step: Duration, count: u32) -> Duration {
    step.saturating_mul(count)
}
