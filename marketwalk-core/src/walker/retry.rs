//! Walk policy: page size, inter-page delay and retry backoff.

use crate::error::AcquireError;
use std::time::Duration;

/// Exponential backoff for retriable page failures.
///
/// Adapters never retry; the walker consults this policy instead. The
/// default performs no retries, so one transport failure ends the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }

    pub fn with_retries(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Self::none()
        }
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
    /// raised to the provider's `retry-after` when one was given.
    pub fn delay_for(&self, attempt: u32, error: &AcquireError) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay);
        match error {
            AcquireError::RateLimited { retry_after_secs } => {
                backoff.max(Duration::from_secs(*retry_after_secs).min(self.max_delay))
            }
            _ => backoff,
        }
    }

    /// Whether `error` after `attempt` failed tries should be retried.
    pub fn should_retry(&self, attempt: u32, error: &AcquireError) -> bool {
        attempt <= self.max_retries && error.is_retriable()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Everything the walker needs besides the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkPolicy {
    /// Records requested per page.
    pub page_limit: usize,
    /// Mandatory pause between consecutive page requests.
    pub page_delay: Duration,
    pub retry: RetryPolicy,
}

impl WalkPolicy {
    pub fn new(page_limit: usize, page_delay: Duration) -> Self {
        Self {
            page_limit,
            page_delay,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for WalkPolicy {
    fn default() -> Self {
        Self::new(1500, Duration::from_secs(1))
    }
}

pub(crate) fn pause(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}
