//! Retry driver for whole-operation re-execution.
//!
//! The operation is a closure from a fresh session to a result. On a
//! retryable error the closure runs again from scratch with a new session;
//! any other error is returned as-is. Backoff is exponential with jitter.

use std::future::Future;
use std::time::Duration;

use metricount_core::error::{MetricError, Result};

use crate::db::driver::{Driver, Session};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Re-runs allowed after the first attempt.
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Sleep before attempt `attempt + 1`, where `attempt` is 1-based.
    ///
    /// `base * 2^(attempt-1)` capped at `max_backoff`, then jittered into the
    /// upper half so concurrent losers of the same conflict spread out.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let ceiling = self
            .base_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff);
        let ms = ceiling.as_millis() as u64;
        if ms < 2 {
            return ceiling;
        }
        Duration::from_millis(fastrand::u64(ms / 2..=ms))
    }
}

/// Run `op` with a fresh session until it succeeds, fails permanently, or the
/// retry budget is spent.
pub async fn retry_operation<T, F, Fut>(policy: &RetryPolicy, driver: &dyn Driver, op: F) -> Result<T>
where
    F: FnMut(Box<dyn Session>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_operation_observed(policy, driver, |_| {}, op).await
}

/// Same as [`retry_operation`], calling `on_retry` for every error that
/// triggers another attempt.
pub async fn retry_operation_observed<T, F, Fut, R>(
    policy: &RetryPolicy,
    driver: &dyn Driver,
    on_retry: R,
    mut op: F,
) -> Result<T>
where
    F: FnMut(Box<dyn Session>) -> Fut,
    Fut: Future<Output = Result<T>>,
    R: Fn(&MetricError),
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let res = match driver.session().await {
            Ok(session) => op(session).await,
            Err(e) => Err(e),
        };

        let err = match res {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };

        if !err.is_retryable() {
            return Err(err);
        }
        if attempt > policy.max_retries {
            tracing::warn!(attempts = attempt, error = %err, "retry budget exhausted");
            return Err(MetricError::RetriesExhausted {
                attempts: attempt,
                last: Box::new(err),
            });
        }

        on_retry(&err);
        let delay = policy.backoff(attempt);
        tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying operation");
        tokio::time::sleep(delay).await;
    }
}
