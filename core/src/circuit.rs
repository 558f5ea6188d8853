//! Circuit breaker implementation using state machines
//!
//! This module holds the configuration, the closed/open/half-open machine and
//! the blocking call path. The non-blocking paths live in
//! [`reactive`](crate::reactive) and share everything here.

use crate::{
    Outcome,
    callbacks::Callbacks,
    classifier::{DefaultClassifier, FailureClassifier, FailureContext},
    clock::{Clock, MonotonicClock},
    errors::{CircuitError, ConfigError},
    metrics::{CallCounters, MetricsSnapshot},
    permit::CallPermit,
    window::SlidingWindow,
};
use parking_lot::Mutex;
use state_machines::state_machine;
use std::sync::{Arc, mpsc};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Failure percentage (0-100] of the sliding window that opens the circuit
    pub failure_rate_threshold: f64,

    /// Calls required in the window before the failure rate is trusted
    ///
    /// Values above `sliding_window_size` behave as `sliding_window_size`.
    pub minimum_calls: usize,

    /// Number of most recent outcomes kept in the sliding window
    pub sliding_window_size: usize,

    /// How long the circuit stays open before admitting probe calls
    pub open_duration: Duration,

    /// Deadline for a single protected call
    pub timeout: Duration,

    /// Probe calls admitted per half-open period; all must succeed to close
    pub half_open_permitted_calls: usize,

    /// Jitter factor for open_duration (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: duration * (1 - jitter + rand * jitter)
    pub jitter_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            minimum_calls: 100,
            sliding_window_size: 100,
            open_duration: Duration::from_secs(60),
            timeout: Duration::from_secs(1),
            half_open_permitted_calls: 10,
            jitter_factor: 0.0,
        }
    }
}

impl Config {
    /// Reject values the state machine cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.failure_rate_threshold > 0.0 && self.failure_rate_threshold <= 100.0) {
            return Err(ConfigError::FailureRateOutOfRange(
                self.failure_rate_threshold,
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::JitterOutOfRange(self.jitter_factor));
        }
        if self.minimum_calls == 0 {
            return Err(ConfigError::Zero {
                field: "minimum_calls",
            });
        }
        if self.sliding_window_size == 0 {
            return Err(ConfigError::Zero {
                field: "sliding_window_size",
            });
        }
        if self.half_open_permitted_calls == 0 {
            return Err(ConfigError::Zero {
                field: "half_open_permitted_calls",
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Zero { field: "timeout" });
        }
        Ok(())
    }
}

/// The three positions of a breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::HalfOpen => "HalfOpen",
        }
    }

    fn from_name(name: &str) -> Self {
        match name {
            "Open" => CircuitState::Open,
            "HalfOpen" => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker context - shared data across all states
///
/// Only the breaker touches the window, always under its own lock.
///
/// ```compile_fail
/// let ctx = breaker_registry::circuit::CircuitContext::default();
/// ctx.window.lock().reset();
/// ```
#[derive(Clone)]
pub struct CircuitContext {
    pub(crate) name: String,
    pub(crate) config: Config,
    pub(crate) window: Arc<Mutex<SlidingWindow>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) failure_classifier: Arc<dyn FailureClassifier>,
}

impl Default for CircuitContext {
    fn default() -> Self {
        let config = Config::default();
        Self {
            name: String::new(),
            window: Arc::new(Mutex::new(SlidingWindow::new(config.sliding_window_size))),
            config,
            clock: Arc::new(MonotonicClock::new()),
            failure_classifier: Arc::new(DefaultClassifier),
        }
    }
}

impl std::fmt::Debug for CircuitContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitContext")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("window", &self.window)
            .field("clock", &self.clock)
            .field("failure_classifier", &self.failure_classifier)
            .finish()
    }
}

/// Data specific to the Open state
#[derive(Debug, Clone, Default)]
pub struct OpenData {
    pub opened_at: Duration,
    /// Cool-off for this open period, jitter already applied
    pub open_for: Duration,
}

/// Data specific to the HalfOpen state
#[derive(Debug, Clone, Default)]
pub struct HalfOpenData {
    /// Probes let through since entering HalfOpen
    pub admitted: usize,
    /// Probes that came back successful
    pub successes: usize,
}

state_machine! {
    name: Circuit,
    context: CircuitContext,
    dynamic: true,

    initial: Closed,
    states: [
        Closed,
        Open(OpenData),
        HalfOpen(HalfOpenData),
    ],
    events {
        trip {
            guards: [should_open],
            transition: { from: [Closed, HalfOpen], to: Open }
        }
        attempt_reset {
            guards: [open_duration_elapsed],
            transition: { from: Open, to: HalfOpen }
        }
        close {
            guards: [should_close],
            transition: { from: HalfOpen, to: Closed }
        }
    }
}

impl Circuit<Closed> {
    /// Failure rate over the window has reached the threshold
    fn should_open(&self, ctx: &CircuitContext) -> bool {
        let window = ctx.window.lock();
        let floor = ctx.config.minimum_calls.min(window.capacity());

        window.total_calls() >= floor
            && window.failure_ratio() * 100.0 >= ctx.config.failure_rate_threshold
    }
}

impl Circuit<HalfOpen> {
    /// Trip is only attempted after a failed probe, and any failed probe reopens
    fn should_open(&self, _ctx: &CircuitContext) -> bool {
        true
    }

    fn should_close(&self, ctx: &CircuitContext) -> bool {
        let data = self
            .state_data_half_open()
            .expect("HalfOpen state must have data");
        data.successes >= ctx.config.half_open_permitted_calls
    }
}

impl Circuit<Open> {
    fn open_duration_elapsed(&self, ctx: &CircuitContext) -> bool {
        let data = self.state_data_open().expect("Open state must have data");
        ctx.clock.now().saturating_sub(data.opened_at) >= data.open_for
    }
}

/// Open duration for a fresh open period, drawn once per trip
///
/// Uses the chrono-machines formula: duration * (1 - jitter + rand * jitter)
fn jittered_open_duration(config: &Config) -> Duration {
    if config.jitter_factor <= 0.0 {
        return config.open_duration;
    }

    let base_ms = u64::try_from(config.open_duration.as_millis()).unwrap_or(u64::MAX);
    let policy = chrono_machines::Policy {
        max_attempts: 1,
        base_delay_ms: base_ms,
        multiplier: 1.0,
        max_delay_ms: base_ms,
    };
    Duration::from_millis(policy.calculate_delay(1, config.jitter_factor))
}

/// State transitions announced to listeners once the lock is released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Opened,
    HalfOpened,
    Closed,
}

struct CircuitCore {
    machine: DynamicCircuit,
    /// Bumped on every transition; outcomes from older generations are dropped
    generation: u64,
}

/// A named circuit breaker
///
/// All methods take `&self`; share one instance across threads or tasks with
/// an `Arc` (which is what [`CircuitBreakerRegistry`](crate::CircuitBreakerRegistry)
/// hands out).
pub struct CircuitBreaker {
    core: Mutex<CircuitCore>,
    context: CircuitContext,
    callbacks: Callbacks,
    counters: CallCounters,
}

impl CircuitBreaker {
    /// Create a breaker with default listeners and clock (use builder() for more options)
    pub fn new(name: impl Into<String>, config: Config) -> Result<Self, ConfigError> {
        crate::builder::CircuitBuilder::new(name).config(config).build()
    }

    /// Create a circuit breaker with custom context and callbacks (used by builder)
    pub(crate) fn with_context_and_callbacks(context: CircuitContext, callbacks: Callbacks) -> Self {
        let machine = DynamicCircuit::new(context.clone());

        Self {
            core: Mutex::new(CircuitCore {
                machine,
                generation: 0,
            }),
            context,
            callbacks,
            counters: CallCounters::default(),
        }
    }

    /// Create a new circuit breaker builder
    pub fn builder(name: impl Into<String>) -> crate::builder::CircuitBuilder {
        crate::builder::CircuitBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }

    /// Execute a fallible operation with circuit breaker protection
    ///
    /// The operation runs on a worker thread while the caller waits for at
    /// most the configured timeout. A result arriving after the deadline is
    /// discarded. Panics inside the operation are recorded as failures and
    /// then resumed on the calling thread.
    ///
    /// Every admitted call spawns its own OS thread. A timed-out operation
    /// is not interrupted and keeps that thread until it returns, so an
    /// operation that hangs forever leaks one thread per call. Prefer
    /// [`call_async`](Self::call_async) for operations that can stall.
    pub fn call<T, E, F>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let permit = self.acquire()?;

        let (tx, rx) = mpsc::sync_channel(1);
        let worker = std::thread::spawn(move || {
            // The receiver is gone once the deadline passed
            let _ = tx.send(f());
        });

        match rx.recv_timeout(self.context.config.timeout) {
            Ok(result) => self.complete(permit, result),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(self.time_out(permit)),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                permit.record(Outcome::Failure);
                match worker.join() {
                    Err(payload) => std::panic::resume_unwind(payload),
                    Ok(()) => unreachable!("worker exited without sending a result"),
                }
            }
        }
    }

    /// Execute with protection, routing every failure into `fallback`
    ///
    /// The caller only ever sees the operation's value or the fallback's
    /// result; an error returned by the fallback itself is passed through.
    /// Threading is the same as [`call`](Self::call): one OS thread per
    /// admitted call, held until the operation returns even past the deadline.
    ///
    /// # Example
    ///
    /// ```rust
    /// use breaker_registry::CircuitBreaker;
    ///
    /// let breaker = CircuitBreaker::builder("greeting").build().unwrap();
    /// let value = breaker.run(
    ///     || Err::<String, String>("boom".into()),
    ///     |_err| Ok("fallback".to_string()),
    /// );
    /// assert_eq!(value.unwrap(), "fallback");
    /// ```
    pub fn run<T, E, F, FB>(&self, f: F, fallback: FB) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        FB: FnOnce(CircuitError<E>) -> Result<T, E>,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.call(f).or_else(fallback)
    }

    /// Ask the state machine for permission to run a call
    ///
    /// Rejections are counted and announced here.
    pub(crate) fn acquire<E>(&self) -> Result<CallPermit<'_>, CircuitError<E>> {
        let mut half_opened = false;

        let admission = {
            let mut core = self.core.lock();

            if core.machine.current_state() == "Open"
                && core.machine.handle(CircuitEvent::AttemptReset).is_ok()
            {
                core.generation += 1;
                if let Some(data) = core.machine.half_open_data_mut() {
                    *data = HalfOpenData::default();
                }
                half_opened = true;
            }

            match core.machine.current_state() {
                "Open" => Err(CircuitError::Open {
                    circuit: self.context.name.clone(),
                    opened_at: core
                        .machine
                        .open_data()
                        .map(|d| d.opened_at)
                        .unwrap_or_default(),
                }),
                "HalfOpen" => {
                    let permitted = self.context.config.half_open_permitted_calls;
                    let generation = core.generation;
                    match core.machine.half_open_data_mut() {
                        Some(data) if data.admitted < permitted => {
                            data.admitted += 1;
                            Ok((generation, true))
                        }
                        _ => Err(CircuitError::HalfOpenLimitReached {
                            circuit: self.context.name.clone(),
                        }),
                    }
                }
                _ => Ok((core.generation, false)),
            }
        };

        if half_opened {
            self.announce(Transition::HalfOpened);
        }

        match admission {
            Ok((generation, probe)) => Ok(CallPermit::new(self, generation, probe)),
            Err(rejection) => {
                self.counters.record_rejected();
                debug!(circuit = %self.context.name, "call rejected");
                self.callbacks.trigger_call_rejected(&self.context.name);
                Err(rejection)
            }
        }
    }

    /// Settle a finished call
    pub(crate) fn complete<T, E: 'static>(
        &self,
        permit: CallPermit<'_>,
        result: Result<T, E>,
    ) -> Result<T, CircuitError<E>> {
        match result {
            Ok(value) => {
                permit.record(Outcome::Success);
                Ok(value)
            }
            Err(error) => {
                let elapsed = permit.elapsed();
                if self.counts_as_failure(&error, elapsed) {
                    permit.record(Outcome::Failure);
                } else {
                    permit.release();
                    self.counters.record_ignored();
                    debug!(circuit = %self.context.name, "error ignored by classifier");
                    self.callbacks
                        .trigger_ignored_error(&self.context.name, elapsed);
                }
                Err(CircuitError::Execution(error))
            }
        }
    }

    /// Settle a call whose deadline passed
    pub(crate) fn time_out<E>(&self, permit: CallPermit<'_>) -> CircuitError<E> {
        let timeout = self.context.config.timeout;
        warn!(circuit = %self.context.name, ?timeout, "call timed out");
        permit.record(Outcome::Timeout);

        CircuitError::Timeout {
            circuit: self.context.name.clone(),
            timeout,
        }
    }

    fn counts_as_failure<E: 'static>(&self, error: &E, duration: Duration) -> bool {
        self.context.failure_classifier.should_trip(&FailureContext {
            circuit_name: &self.context.name,
            error: error as &dyn std::any::Any,
            duration,
        })
    }

    /// Record an outcome and drive the state machine
    pub(crate) fn on_outcome(&self, generation: u64, outcome: Outcome, elapsed: Duration) {
        let transition = {
            let mut core = self.core.lock();

            if core.generation != generation {
                debug!(
                    circuit = %self.context.name,
                    ?outcome,
                    "dropping outcome admitted before the last transition"
                );
                None
            } else {
                self.context.window.lock().record(outcome);

                match core.machine.current_state() {
                    "HalfOpen" if outcome == Outcome::Success => {
                        if let Some(data) = core.machine.half_open_data_mut() {
                            data.successes += 1;
                        }
                        if core.machine.handle(CircuitEvent::Close).is_ok() {
                            core.generation += 1;
                            self.context.window.lock().reset();
                            Some(Transition::Closed)
                        } else {
                            None
                        }
                    }
                    "HalfOpen" | "Closed" => self.try_trip(&mut core),
                    _ => None,
                }
            }
        };

        self.counters.record(outcome);
        match outcome {
            Outcome::Success => self.callbacks.trigger_success(&self.context.name, elapsed),
            _ => self
                .callbacks
                .trigger_error(&self.context.name, outcome, elapsed),
        }

        if let Some(transition) = transition {
            self.announce(transition);
        }
    }

    /// Give a permit back without recording an outcome
    pub(crate) fn release_permit(&self, generation: u64, probe: bool) {
        if !probe {
            return;
        }

        let mut core = self.core.lock();
        if core.generation == generation
            && let Some(data) = core.machine.half_open_data_mut()
        {
            data.admitted = data.admitted.saturating_sub(1);
        }
    }

    /// Apply Open-state bookkeeping (timestamp, fresh generation, empty window)
    fn try_trip(&self, core: &mut CircuitCore) -> Option<Transition> {
        core.machine.handle(CircuitEvent::Trip).ok()?;

        if let Some(data) = core.machine.open_data_mut() {
            *data = OpenData {
                opened_at: self.context.clock.now(),
                open_for: jittered_open_duration(&self.context.config),
            };
        }
        core.generation += 1;
        self.context.window.lock().reset();
        Some(Transition::Opened)
    }

    fn announce(&self, transition: Transition) {
        let name = &self.context.name;
        match transition {
            Transition::Opened => {
                info!(circuit = %name, "circuit opened");
                self.callbacks.trigger_open(name);
            }
            Transition::HalfOpened => {
                info!(circuit = %name, "circuit half-open, admitting probe calls");
                self.callbacks.trigger_half_open(name);
            }
            Transition::Closed => {
                info!(circuit = %name, "circuit closed");
                self.callbacks.trigger_close(name);
            }
        }
    }

    pub(crate) fn clock_now(&self) -> Duration {
        self.context.clock.now()
    }

    /// Current state
    ///
    /// Open → HalfOpen happens lazily on the next call once the open
    /// duration has elapsed, so this may still report `Open` after expiry.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_name(self.core.lock().machine.current_state())
    }

    /// Get current state name
    pub fn state_name(&self) -> &'static str {
        self.state().as_str()
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    pub fn is_half_open(&self) -> bool {
        self.state() == CircuitState::HalfOpen
    }

    /// Counters plus the current window contents
    pub fn metrics(&self) -> MetricsSnapshot {
        let (buffered, ratio) = {
            let window = self.context.window.lock();
            (window.total_calls(), window.failure_ratio())
        };
        self.counters.snapshot(buffered, ratio * 100.0)
    }

    /// Clear the window and force the circuit back to Closed
    ///
    /// Calls still in flight are not recorded when they finish.
    pub fn reset(&self) {
        let mut core = self.core.lock();
        core.machine = DynamicCircuit::new(self.context.clone());
        core.generation += 1;
        self.context.window.lock().reset();
        info!(circuit = %self.context.name, "circuit reset");
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.context.name)
            .field("state", &self.state())
            .field("config", &self.context.config)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
