//! Per-breaker call counters

use crate::Outcome;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifetime counters, bumped without taking the breaker lock
#[derive(Debug, Default)]
pub(crate) struct CallCounters {
    successful: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    rejected: AtomicU64,
    ignored: AtomicU64,
}

impl CallCounters {
    pub(crate) fn record(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Success => &self.successful,
            Outcome::Failure => &self.failed,
            Outcome::Timeout => &self.timed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, buffered_calls: usize, failure_rate: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            successful_calls: self.successful.load(Ordering::Relaxed),
            failed_calls: self.failed.load(Ordering::Relaxed),
            timed_out_calls: self.timed_out.load(Ordering::Relaxed),
            rejected_calls: self.rejected.load(Ordering::Relaxed),
            ignored_errors: self.ignored.load(Ordering::Relaxed),
            buffered_calls,
            failure_rate,
        }
    }
}

/// Point-in-time view of a breaker's counters and window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub timed_out_calls: u64,
    /// Calls short-circuited while open or with the probe quota in use
    pub rejected_calls: u64,
    /// Errors the failure classifier chose not to count
    pub ignored_errors: u64,
    /// Outcomes currently held by the sliding window
    pub buffered_calls: usize,
    /// Window failure rate as a percentage
    pub failure_rate: f64,
}
