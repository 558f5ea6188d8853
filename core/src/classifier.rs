//! Deciding which operation errors count against the circuit
//!
//! An error the classifier accepts is recorded as a failure. An error it
//! rejects is "ignored": the fallback still runs, but nothing is recorded and
//! a half-open probe slot is handed back.

use std::any::Any;
use std::time::Duration;

/// What a classifier gets to look at
#[derive(Debug)]
pub struct FailureContext<'a> {
    pub circuit_name: &'a str,
    /// The operation's error; downcast to inspect it
    pub error: &'a dyn Any,
    /// How long the call ran before failing
    pub duration: Duration,
}

/// Decides whether an error should count as a failure
///
/// # Examples
///
/// ```rust
/// use breaker_registry::{FailureClassifier, FailureContext};
///
/// #[derive(Debug)]
/// struct HttpStatus(u16);
///
/// #[derive(Debug)]
/// struct ServerErrorsOnly;
///
/// impl FailureClassifier for ServerErrorsOnly {
///     fn should_trip(&self, ctx: &FailureContext<'_>) -> bool {
///         ctx.error
///             .downcast_ref::<HttpStatus>()
///             .is_none_or(|status| status.0 >= 500)
///     }
/// }
/// ```
pub trait FailureClassifier: Send + Sync + std::fmt::Debug {
    /// `true` records the error as a failure, `false` ignores it
    fn should_trip(&self, ctx: &FailureContext<'_>) -> bool;
}

/// Counts every error
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl FailureClassifier for DefaultClassifier {
    fn should_trip(&self, _ctx: &FailureContext<'_>) -> bool {
        true
    }
}

/// Classifier built from a closure
pub struct PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    predicate: F,
}

impl<F> PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> FailureClassifier for PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    fn should_trip(&self, ctx: &FailureContext<'_>) -> bool {
        (self.predicate)(ctx)
    }
}

impl<F> std::fmt::Debug for PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateClassifier")
            .field("predicate", &"<closure>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum LookupError {
        NotFound,
        Unavailable,
    }

    fn context<'a>(error: &'a dyn Any, duration: Duration) -> FailureContext<'a> {
        FailureContext {
            circuit_name: "catalog",
            error,
            duration,
        }
    }

    #[test]
    fn test_default_classifier_counts_everything() {
        let err = LookupError::NotFound;
        assert!(DefaultClassifier.should_trip(&context(&err, Duration::ZERO)));
    }

    #[test]
    fn test_predicate_on_error_variant() {
        let classifier = PredicateClassifier::new(|ctx| {
            !matches!(
                ctx.error.downcast_ref::<LookupError>(),
                Some(LookupError::NotFound)
            )
        });

        let missing = LookupError::NotFound;
        let down = LookupError::Unavailable;
        let foreign = "some other error";

        assert!(!classifier.should_trip(&context(&missing, Duration::ZERO)));
        assert!(classifier.should_trip(&context(&down, Duration::ZERO)));
        // Unknown types still count
        assert!(classifier.should_trip(&context(&foreign, Duration::ZERO)));
    }

    #[test]
    fn test_predicate_on_duration() {
        let classifier = PredicateClassifier::new(|ctx| ctx.duration >= Duration::from_millis(100));
        let err = LookupError::Unavailable;

        assert!(!classifier.should_trip(&context(&err, Duration::from_millis(20))));
        assert!(classifier.should_trip(&context(&err, Duration::from_millis(150))));
    }
}
