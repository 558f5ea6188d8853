//! Builder API for ergonomic circuit breaker configuration

use crate::{
    Outcome,
    callbacks::Callbacks,
    circuit::{CircuitBreaker, CircuitContext, Config},
    classifier::{DefaultClassifier, FailureClassifier},
    clock::{Clock, MonotonicClock},
    errors::ConfigError,
    window::SlidingWindow,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating circuit breakers with fluent API
///
/// This is also what registry customizers receive, so anything a customizer
/// may want to change before first use has a method here.
pub struct CircuitBuilder {
    name: String,
    config: Config,
    clock: Option<Arc<dyn Clock>>,
    failure_classifier: Arc<dyn FailureClassifier>,
    callbacks: Callbacks,
}

impl CircuitBuilder {
    /// Create a new builder for a circuit with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Config::default(),
            clock: None,
            failure_classifier: Arc::new(DefaultClassifier),
            callbacks: Callbacks::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration as it stands
    pub fn current_config(&self) -> &Config {
        &self.config
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the failure rate (percent, 0-100] that opens the circuit
    pub fn failure_rate_threshold(mut self, percent: f64) -> Self {
        self.config.failure_rate_threshold = percent;
        self
    }

    /// Set minimum number of calls before the failure rate is evaluated
    pub fn minimum_calls(mut self, calls: usize) -> Self {
        self.config.minimum_calls = calls;
        self
    }

    /// Set how many recent outcomes the sliding window keeps
    pub fn sliding_window_size(mut self, size: usize) -> Self {
        self.config.sliding_window_size = size;
        self
    }

    /// Set how long the circuit stays open before probing
    pub fn open_duration(mut self, duration: Duration) -> Self {
        self.config.open_duration = duration;
        self
    }

    /// Set the per-call deadline
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the number of probe calls admitted while half-open
    pub fn half_open_permitted_calls(mut self, calls: usize) -> Self {
        self.config.half_open_permitted_calls = calls;
        self
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: duration * (1 - jitter + rand * jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.config.jitter_factor = factor;
        self
    }

    /// Use a custom time source
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set a failure classifier to filter which errors count as failures
    ///
    /// Without one, every error counts ([`DefaultClassifier`]).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use breaker_registry::{CircuitBreaker, PredicateClassifier};
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// let circuit = CircuitBreaker::builder("api")
    ///     .failure_classifier(Arc::new(PredicateClassifier::new(|ctx| {
    ///         // Fast failures are validation errors, not outages
    ///         ctx.duration > Duration::from_millis(50)
    ///     })))
    ///     .build()
    ///     .unwrap();
    /// # let _ = circuit;
    /// ```
    pub fn failure_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.failure_classifier = classifier;
        self
    }

    /// Add a listener for successful calls
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, Duration) + Send + Sync + 'static,
    {
        self.callbacks.on_success.push(Arc::new(f));
        self
    }

    /// Add a listener for failed and timed-out calls
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, Outcome, Duration) + Send + Sync + 'static,
    {
        self.callbacks.on_error.push(Arc::new(f));
        self
    }

    /// Add a listener for calls short-circuited without running
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_call_rejected.push(Arc::new(f));
        self
    }

    /// Add a listener for errors the failure classifier chose to ignore
    pub fn on_ignored_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, Duration) + Send + Sync + 'static,
    {
        self.callbacks.on_ignored_error.push(Arc::new(f));
        self
    }

    /// Add a listener for when circuit opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_open.push(Arc::new(f));
        self
    }

    /// Add a listener for when circuit closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close.push(Arc::new(f));
        self
    }

    /// Add a listener for when circuit enters half-open
    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_half_open.push(Arc::new(f));
        self
    }

    /// Validate the configuration and build the circuit breaker
    pub fn build(self) -> Result<CircuitBreaker, ConfigError> {
        self.config.validate()?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        let context = CircuitContext {
            name: self.name,
            window: Arc::new(Mutex::new(SlidingWindow::new(
                self.config.sliding_window_size,
            ))),
            config: self.config,
            clock,
            failure_classifier: self.failure_classifier,
        };

        Ok(CircuitBreaker::with_context_and_callbacks(
            context,
            self.callbacks,
        ))
    }
}

impl std::fmt::Debug for CircuitBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBuilder")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let circuit = CircuitBuilder::new("test").build().expect("valid config");

        assert_eq!(circuit.state_name(), "Closed");
        assert_eq!(circuit.config(), &Config::default());
    }

    #[test]
    fn test_builder_custom_config() {
        let circuit = CircuitBuilder::new("test")
            .failure_rate_threshold(25.0)
            .minimum_calls(10)
            .sliding_window_size(20)
            .open_duration(Duration::from_secs(5))
            .timeout(Duration::from_millis(250))
            .half_open_permitted_calls(3)
            .build()
            .expect("valid config");

        let config = circuit.config();
        assert_eq!(config.failure_rate_threshold, 25.0);
        assert_eq!(config.minimum_calls, 10);
        assert_eq!(config.sliding_window_size, 20);
        assert_eq!(config.open_duration, Duration::from_secs(5));
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.half_open_permitted_calls, 3);
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        let err = CircuitBuilder::new("test")
            .failure_rate_threshold(120.0)
            .build()
            .expect_err("threshold above 100%");
        assert!(matches!(err, ConfigError::FailureRateOutOfRange(v) if v == 120.0));

        let err = CircuitBuilder::new("test")
            .half_open_permitted_calls(0)
            .build()
            .expect_err("no probes");
        assert!(matches!(
            err,
            ConfigError::Zero {
                field: "half_open_permitted_calls"
            }
        ));
    }

    #[test]
    fn test_builder_counts_every_error_by_default() {
        let circuit = CircuitBuilder::new("test")
            .minimum_calls(1)
            .build()
            .expect("valid config");

        let _ = circuit.call(|| Err::<(), _>(std::io::Error::other("any error")));

        assert!(circuit.is_open());
        assert_eq!(circuit.metrics().ignored_errors, 0);
    }

    #[test]
    fn test_builder_with_callbacks() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let opened = Arc::new(AtomicBool::new(false));
        let opened_clone = opened.clone();

        let circuit = CircuitBuilder::new("test")
            .minimum_calls(2)
            .on_open(move |_name| {
                opened_clone.store(true, Ordering::SeqCst);
            })
            .build()
            .expect("valid config");

        let _ = circuit.call(|| Err::<(), _>("error 1"));
        let _ = circuit.call(|| Err::<(), _>("error 2"));

        assert!(opened.load(Ordering::SeqCst));
    }
}
