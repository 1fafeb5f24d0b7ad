//! Uniform timeout combinator for external calls.
//!
//! Every network call and spawned-process call that can hang is raced against
//! an explicit timer. The three-way [`Timed`] result keeps timeouts distinct
//! from ordinary failures so call sites can apply their own fallback contract
//! instead of pattern-matching on error identity.

use std::future::Future;
use std::time::Duration;

/// Outcome of racing an operation against a timer.
#[derive(Debug)]
pub enum Timed<T, E> {
    /// The operation completed successfully before the deadline.
    Completed(T),
    /// The operation completed with an error before the deadline.
    Failed(E),
    /// The deadline elapsed first; the operation future was dropped.
    TimedOut,
}

impl<T, E> Timed<T, E> {
    /// Whether the deadline won the race.
    pub fn timed_out(&self) -> bool {
        matches!(self, Timed::TimedOut)
    }

    /// Collapse into a `Result`, mapping a timeout through `on_timeout`.
    pub fn into_result(self, on_timeout: impl FnOnce() -> E) -> Result<T, E> {
        match self {
            Timed::Completed(v) => Ok(v),
            Timed::Failed(e) => Err(e),
            Timed::TimedOut => Err(on_timeout()),
        }
    }
}

/// Race `operation` against `deadline`.
///
/// Dropping the operation future on timeout cancels it at its next await
/// point; spawned subprocesses must use `kill_on_drop` so cancellation
/// reaps them.
pub async fn with_timeout<T, E, F>(deadline: Duration, operation: F) -> Timed<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(Ok(v)) => Timed::Completed(v),
        Ok(Err(e)) => Timed::Failed(e),
        Err(_) => Timed::TimedOut,
    }
}
