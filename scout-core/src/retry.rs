//! Exponential-backoff retry for reasoning calls.

use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{LlmError, RoleError};

/// Backoff is capped at this multiple of the base delay.
const MAX_BACKOFF_SHIFT: u32 = 5;

/// Classifies an error for `RetryPolicy::run`.
pub trait Retryable {
    /// Whether another attempt may succeed.
    fn is_retryable(&self) -> bool;

    /// The minimum wait the failing side asked for, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. } | LlmError::Timeout { .. } | LlmError::Connection { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }
}

impl Retryable for RoleError {
    /// Schema violations get another attempt; capability errors only when
    /// the underlying failure is transient.
    fn is_retryable(&self) -> bool {
        match self {
            RoleError::Capability { source, .. } => source.is_retryable(),
            RoleError::Schema { .. } | RoleError::Failed { .. } => true,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            RoleError::Capability { source, .. } => source.retry_after(),
            _ => None,
        }
    }
}

/// How many times to retry a failed call and how long to wait in between.
///
/// The wait before retry `n` (0-based) is `base_delay * 2^n`, so a base of one
/// second yields 1s, 2s, 4s. A rate limit stretches the wait to whatever the
/// provider asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// A policy that tries exactly once.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << attempt.min(MAX_BACKOFF_SHIFT))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retries are used up. The last error is returned in the latter cases.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => {
                    warn!(operation, error = %e, "Not retrying permanent failure");
                    return Err(e);
                }
                Err(e) if attempt < self.max_retries => {
                    let backoff = self.delay_for(attempt);
                    let wait = e.retry_after().map_or(backoff, |after| after.max(backoff));
                    info!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        backoff_ms = wait.as_millis() as u64,
                        error = %e,
                        "Retrying after failure"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
