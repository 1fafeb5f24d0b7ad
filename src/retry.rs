//! Generic bounded-retry engine with exponential backoff.
//!
//! Wraps a fallible async operation with a [`RetryPolicy`]: up to
//! `max_attempts` tries, exponentially growing delay capped at `max_delay`,
//! and a classifier that short-circuits retries for failures that cannot
//! succeed on a repeat attempt (auth, invalid media, permanent quota).

use crate::report::{NoticeLevel, ProgressReporter};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Immutable retry configuration, one value per call site.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Ceiling applied to every computed delay.
    pub max_delay: Duration,
    /// Growth factor applied per retry.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(15),
            max_delay: Duration::from_secs(120),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let delay = self.base_delay.as_secs_f64() * self.multiplier.powi(exp as i32);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// Run `operation` under `policy`, consulting `non_retryable` after each
/// failure and warning `reporter` before every retry wait.
///
/// The final error is annotated with `context` and the attempt count.
pub async fn with_retry<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    context: &str,
    reporter: &dyn ProgressReporter,
    non_retryable: C,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if non_retryable(&error) {
                    tracing::error!(context, attempt, %error, "non-retryable failure");
                    return Err(RetryError {
                        context: context.to_string(),
                        attempts: attempt,
                        non_retryable: true,
                        source: error,
                    });
                }

                if attempt >= policy.max_attempts {
                    tracing::error!(context, attempt, %error, "retries exhausted");
                    return Err(RetryError {
                        context: context.to_string(),
                        attempts: attempt,
                        non_retryable: false,
                        source: error,
                    });
                }

                let delay = policy.delay_after(attempt);
                reporter
                    .notice(
                        NoticeLevel::Warning,
                        &format!(
                            "{}: attempt {}/{} failed ({}), retrying in {}s",
                            context,
                            attempt,
                            policy.max_attempts,
                            error,
                            delay.as_secs()
                        ),
                    )
                    .await;
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// A failure that survived the retry engine, annotated with its call site.
#[derive(Debug, thiserror::Error)]
#[error("{context} failed after {attempts} attempt(s): {source}")]
pub struct RetryError<E: Display> {
    pub context: String,
    pub attempts: u32,
    pub non_retryable: bool,
    #[source]
    pub source: E,
}
