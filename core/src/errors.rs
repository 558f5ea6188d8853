//! Error types for circuit breaker operations

use std::error::Error;
use std::time::Duration;

/// Errors that can occur during a protected call
///
/// [`CircuitBreaker::run`](crate::CircuitBreaker::run) routes every variant
/// into the fallback; only [`CircuitBreaker::call`](crate::CircuitBreaker::call)
/// hands them to the caller directly.
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E = Box<dyn Error + Send + Sync>> {
    /// Circuit is open, calls are being rejected
    #[error("Circuit '{circuit}' is open (opened at {opened_at:?})")]
    Open { circuit: String, opened_at: Duration },
    /// Half-open probe quota is in use
    #[error("Circuit '{circuit}' half-open request limit reached")]
    HalfOpenLimitReached { circuit: String },
    /// The call did not finish before its deadline
    #[error("Circuit '{circuit}' call timed out after {timeout:?}")]
    Timeout { circuit: String, timeout: Duration },
    /// The wrapped operation failed
    #[error("Circuit execution failed: {0}")]
    Execution(#[source] E),
}

impl<E> CircuitError<E> {
    /// True when the call was rejected without running the operation
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            CircuitError::Open { .. } | CircuitError::HalfOpenLimitReached { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CircuitError::Timeout { .. })
    }

    /// The operation's own error, if that is what happened
    pub fn into_execution(self) -> Option<E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors raised while configuring breakers or the registry
///
/// These surface at registration or build time, never from a call.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failure rate threshold must be within (0, 100], got {0}")]
    FailureRateOutOfRange(f64),
    #[error("jitter factor must be within [0, 1], got {0}")]
    JitterOutOfRange(f64),
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    /// A per-name registration arrived after that breaker was built
    #[error("circuit '{circuit}' is already constructed")]
    AlreadyConstructed { circuit: String },
    #[error("invalid circuit breaker settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read circuit breaker settings: {0}")]
    Io(#[from] std::io::Error),
}
