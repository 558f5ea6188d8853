//! Call permits
//!
//! A permit is handed out when the state machine admits a call and must be
//! settled exactly once: either with an outcome, or released without one.
//! Dropping an unsettled permit releases it, so a cancelled future or a
//! panicking caller can never leak a half-open probe slot.

use crate::{CircuitBreaker, Outcome};
use std::time::Duration;

/// Proof that a call was admitted
#[derive(Debug)]
pub(crate) struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    /// State-machine generation the call was admitted in
    generation: u64,
    probe: bool,
    started: Duration,
    settled: bool,
}

impl<'a> CallPermit<'a> {
    pub(crate) fn new(breaker: &'a CircuitBreaker, generation: u64, probe: bool) -> Self {
        Self {
            breaker,
            generation,
            probe,
            started: breaker.clock_now(),
            settled: false,
        }
    }

    /// Time since the permit was granted
    pub(crate) fn elapsed(&self) -> Duration {
        self.breaker.clock_now().saturating_sub(self.started)
    }

    /// Settle with an outcome, feeding the window and the state machine
    pub(crate) fn record(mut self, outcome: Outcome) {
        self.settled = true;
        let elapsed = self.elapsed();
        self.breaker.on_outcome(self.generation, outcome, elapsed);
    }

    /// Settle without recording anything
    pub(crate) fn release(mut self) {
        self.settled = true;
        self.breaker.release_permit(self.generation, self.probe);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release_permit(self.generation, self.probe);
        }
    }
}
