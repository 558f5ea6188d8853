//! Non-blocking call paths
//!
//! Futures and streams go through the same permit, recording and state
//! machine as the blocking path. Deadlines are enforced with
//! `tokio::time::timeout`, which drops the in-flight future when it fires, so
//! a completion racing the deadline can never be recorded twice.
//!
//! These methods need to run inside a Tokio runtime with the time driver
//! enabled.

use crate::{CircuitBreaker, CircuitError};
use async_stream::stream;
use futures::{Stream, StreamExt};
use std::future::Future;

impl CircuitBreaker {
    /// Await `operation` with circuit breaker protection
    ///
    /// Dropping the returned future before it completes gives any half-open
    /// probe slot back without recording an outcome.
    pub async fn call_async<T, E, Fut>(&self, operation: Fut) -> Result<T, CircuitError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
        E: 'static,
    {
        let permit = self.acquire()?;

        match tokio::time::timeout(self.config().timeout, operation).await {
            Ok(result) => self.complete(permit, result),
            Err(_elapsed) => Err(self.time_out(permit)),
        }
    }

    /// Await `operation`, routing every failure into an async `fallback`
    ///
    /// # Example
    ///
    /// ```rust
    /// use breaker_registry::CircuitBreaker;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let breaker = CircuitBreaker::builder("quotes").build().unwrap();
    /// let quote = breaker
    ///     .run_async(
    ///         async { Err::<u32, &str>("upstream down") },
    ///         |_err| async { Ok(0) },
    ///     )
    ///     .await;
    /// assert_eq!(quote, Ok(0));
    /// # }
    /// ```
    pub async fn run_async<T, E, Fut, FB, FbFut>(&self, operation: Fut, fallback: FB) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce(CircuitError<E>) -> FbFut,
        FbFut: Future<Output = Result<T, E>>,
        E: 'static,
    {
        match self.call_async(operation).await {
            Ok(value) => Ok(value),
            Err(err) => fallback(err).await,
        }
    }

    /// Forward a stream with circuit breaker protection
    ///
    /// Items pass through as they arrive. The timeout applies to every wait
    /// for the next item. An error item or an expired wait records a failure
    /// or timeout and the rest of the output comes from the fallback stream;
    /// items already forwarded stay delivered. Reaching the end of the source
    /// stream records a success. A rejected call yields only the fallback.
    pub fn run_stream<'a, T, E, S, FB, FS>(
        &'a self,
        source: S,
        fallback: FB,
    ) -> impl Stream<Item = Result<T, E>> + 'a
    where
        S: Stream<Item = Result<T, E>> + 'a,
        FB: FnOnce(CircuitError<E>) -> FS + 'a,
        FS: Stream<Item = Result<T, E>> + 'a,
        T: 'a,
        E: 'static,
    {
        stream! {
            let failure = match self.acquire::<E>() {
                Err(rejection) => Some(rejection),
                Ok(permit) => {
                    let timeout = self.config().timeout;
                    let mut source = std::pin::pin!(source);

                    loop {
                        match tokio::time::timeout(timeout, source.next()).await {
                            Ok(Some(Ok(item))) => yield Ok(item),
                            Ok(Some(Err(error))) => {
                                break self.complete::<T, E>(permit, Err(error)).err();
                            }
                            Ok(None) => {
                                break self.complete::<(), E>(permit, Ok(())).err();
                            }
                            Err(_elapsed) => break Some(self.time_out(permit)),
                        }
                    }
                }
            };

            if let Some(err) = failure {
                for await item in fallback(err) {
                    yield item;
                }
            }
        }
    }
}
