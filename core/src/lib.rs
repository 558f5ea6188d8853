//! breaker-registry - named circuit breakers with timeouts and fallbacks
//!
//! This crate provides:
//! - A count-based sliding window of call outcomes with a rolling failure rate
//! - State machine for circuit breaker lifecycle (Closed → Open → HalfOpen)
//! - Per-call deadlines for blocking closures, futures and streams
//! - A registry that builds each named breaker once, from a default
//!   configuration, per-name overrides and customizers
//!
//! # Example
//!
//! ```rust
//! use breaker_registry::{CircuitBreakerRegistry, Config};
//! use std::time::Duration;
//!
//! let registry = CircuitBreakerRegistry::new();
//! registry.configure_default(|_name| Config {
//!     timeout: Duration::from_secs(4),
//!     ..Config::default()
//! });
//! registry
//!     .configure(
//!         |config| Config { timeout: Duration::from_secs(2), ..config },
//!         &["slow"],
//!     )
//!     .unwrap();
//! registry
//!     .add_customizer(
//!         |builder| builder.on_error(|name, outcome, _| println!("{name}: {outcome:?}")),
//!         &["slow"],
//!     )
//!     .unwrap();
//!
//! let breaker = registry.create("slow").unwrap();
//! let greeting = breaker.run(|| Ok::<_, String>("hello"), |_err| Ok("fallback"));
//! assert_eq!(greeting, Ok("hello"));
//! assert_eq!(breaker.config().timeout, Duration::from_secs(2));
//! ```

pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod classifier;
pub mod clock;
pub mod errors;
pub mod metrics;
mod permit;
pub mod reactive;
pub mod registry;
pub mod settings;
pub mod window;

pub use builder::CircuitBuilder;
pub use circuit::{CircuitBreaker, CircuitState, Config};
pub use classifier::{DefaultClassifier, FailureClassifier, FailureContext, PredicateClassifier};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use errors::{CircuitError, ConfigError};
pub use metrics::MetricsSnapshot;
pub use registry::CircuitBreakerRegistry;
pub use settings::{ConfigOverride, RegistrySettings};
pub use window::SlidingWindow;

/// How a single admitted call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Failure,
    Timeout,
}

impl Outcome {
    /// Failures and timeouts both count against the circuit
    pub fn is_failure(self) -> bool {
        !matches!(self, Outcome::Success)
    }
}
