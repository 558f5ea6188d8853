//! Count-based sliding window of call outcomes
//!
//! The window keeps the last N outcomes in a ring buffer and maintains the
//! failure count incrementally, so recording and reading the failure ratio are
//! both O(1). It is not synchronized; [`CircuitBreaker`](crate::CircuitBreaker)
//! guards it with a mutex.

use crate::Outcome;

/// Fixed-capacity ring of recent call outcomes
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    outcomes: Vec<Outcome>,
    capacity: usize,
    /// Slot that the next record overwrites once the ring is full
    head: usize,
    failures: usize,
}

impl SlidingWindow {
    /// Create an empty window holding at most `capacity` outcomes
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Sliding window size must be greater than 0");
        Self {
            outcomes: Vec::with_capacity(capacity),
            capacity,
            head: 0,
            failures: 0,
        }
    }

    /// Append an outcome, evicting the oldest one when full
    pub fn record(&mut self, outcome: Outcome) {
        if self.outcomes.len() < self.capacity {
            self.outcomes.push(outcome);
        } else {
            let evicted = std::mem::replace(&mut self.outcomes[self.head], outcome);
            self.head = (self.head + 1) % self.capacity;
            if evicted.is_failure() {
                self.failures -= 1;
            }
        }

        if outcome.is_failure() {
            self.failures += 1;
        }
    }

    /// Fraction of recorded calls that failed or timed out, in `[0, 1]`
    pub fn failure_ratio(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.failures as f64 / self.outcomes.len() as f64
    }

    /// Number of calls currently held (never more than the capacity)
    pub fn total_calls(&self) -> usize {
        self.outcomes.len()
    }

    /// Number of held calls that failed or timed out
    pub fn failure_count(&self) -> usize {
        self.failures
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every recorded outcome
    pub fn reset(&mut self) {
        self.outcomes.clear();
        self.head = 0;
        self.failures = 0;
    }
}
