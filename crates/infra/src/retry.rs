//! Time limits on store calls and bounded retry for idempotent reads.
//!
//! Writes are never retried here: a timed-out order insert may or may not
//! have landed, and re-sending it could create a duplicate order.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::CoreConfig;
use crate::error::{ErrorKind, OrderError};

/// The store call did not answer within its time limit. Its outcome is
/// unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedOut {
    pub operation: &'static str,
    pub limit: Duration,
}

impl From<TimedOut> for OrderError {
    fn from(value: TimedOut) -> Self {
        OrderError::Persistence(format!(
            "{} timed out after {:?}",
            value.operation, value.limit
        ))
    }
}

/// Run one store call under `limit`.
///
/// The outer `Err` is the timeout; the inner result is the call's own.
pub async fn bounded<T, E, F>(
    operation: &'static str,
    limit: Duration,
    call: F,
) -> Result<Result<T, E>, TimedOut>
where
    F: Future<Output = Result<T, E>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| TimedOut { operation, limit })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub backoff: Duration,
    pub timeout: Duration,
}

impl From<&CoreConfig> for RetryPolicy {
    fn from(cfg: &CoreConfig) -> Self {
        Self {
            attempts: cfg.read_retry_attempts.max(1),
            backoff: cfg.read_retry_backoff,
            timeout: cfg.store_timeout,
        }
    }
}

/// Run an idempotent read, retrying persistence failures (including
/// timeouts) with linear backoff. Any other error is returned at once.
pub async fn read_with_retry<T, E, F, Fut>(
    operation: &'static str,
    policy: RetryPolicy,
    mut read: F,
) -> Result<T, OrderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<OrderError>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        let outcome = match bounded(operation, policy.timeout, read()).await {
            Ok(inner) => inner.map_err(Into::into),
            Err(timed_out) => Err(timed_out.into()),
        };

        match outcome {
            Err(err) if err.kind() == ErrorKind::Persistence && attempt < attempts => {
                warn!(operation, attempt, error = %err, "read failed; retrying");
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
