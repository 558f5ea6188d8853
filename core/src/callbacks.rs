//! Listener system for call outcomes and state transitions
//!
//! Listeners are attached on the [`CircuitBuilder`](crate::CircuitBuilder)
//! and frozen with the breaker. Several listeners may be registered for the
//! same event; they fire in registration order, after the breaker's internal
//! lock has been released.

use crate::Outcome;
use std::sync::Arc;
use std::time::Duration;

/// Listener receiving the circuit name
pub type StateListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Listener receiving the circuit name and call duration
///
/// Used for successful calls and for errors the classifier ignored.
pub type SuccessListener = Arc<dyn Fn(&str, Duration) + Send + Sync>;

/// Listener for failed or timed-out calls
pub type ErrorListener = Arc<dyn Fn(&str, Outcome, Duration) + Send + Sync>;

/// Listeners for circuit breaker events
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_success: Vec<SuccessListener>,
    pub on_error: Vec<ErrorListener>,
    pub on_call_rejected: Vec<StateListener>,
    pub on_ignored_error: Vec<SuccessListener>,
    pub on_open: Vec<StateListener>,
    pub on_close: Vec<StateListener>,
    pub on_half_open: Vec<StateListener>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger_success(&self, circuit: &str, elapsed: Duration) {
        for listener in &self.on_success {
            listener(circuit, elapsed);
        }
    }

    pub fn trigger_error(&self, circuit: &str, outcome: Outcome, elapsed: Duration) {
        for listener in &self.on_error {
            listener(circuit, outcome, elapsed);
        }
    }

    pub fn trigger_ignored_error(&self, circuit: &str, elapsed: Duration) {
        for listener in &self.on_ignored_error {
            listener(circuit, elapsed);
        }
    }

    pub fn trigger_call_rejected(&self, circuit: &str) {
        fire(&self.on_call_rejected, circuit);
    }

    pub fn trigger_open(&self, circuit: &str) {
        fire(&self.on_open, circuit);
    }

    pub fn trigger_close(&self, circuit: &str) {
        fire(&self.on_close, circuit);
    }

    pub fn trigger_half_open(&self, circuit: &str) {
        fire(&self.on_half_open, circuit);
    }
}

fn fire(listeners: &[StateListener], circuit: &str) {
    for listener in listeners {
        listener(circuit);
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_success", &self.on_success.len())
            .field("on_error", &self.on_error.len())
            .field("on_call_rejected", &self.on_call_rejected.len())
            .field("on_ignored_error", &self.on_ignored_error.len())
            .field("on_open", &self.on_open.len())
            .field("on_close", &self.on_close.len())
            .field("on_half_open", &self.on_half_open.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_every_listener_fires() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut callbacks = Callbacks::new();

        for _ in 0..3 {
            let hits = hits.clone();
            callbacks.on_open.push(Arc::new(move |name| {
                assert_eq!(name, "inventory");
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }

        callbacks.trigger_open("inventory");
        callbacks.trigger_close("inventory");

        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_error_listener_receives_outcome() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let mut callbacks = Callbacks::new();
        callbacks.on_error.push(Arc::new(move |_name, outcome, _elapsed| {
            seen_clone.lock().push(outcome);
        }));

        callbacks.trigger_error("x", Outcome::Timeout, Duration::from_millis(5));
        callbacks.trigger_error("x", Outcome::Failure, Duration::ZERO);

        assert_eq!(*seen.lock(), vec![Outcome::Timeout, Outcome::Failure]);
    }

    #[test]
    fn test_debug_reports_listener_counts() {
        let mut callbacks = Callbacks::new();
        callbacks.on_success.push(Arc::new(|_, _| {}));

        let rendered = format!("{:?}", callbacks);
        assert!(rendered.contains("on_success: 1"));
        assert!(rendered.contains("on_error: 0"));
    }
}
