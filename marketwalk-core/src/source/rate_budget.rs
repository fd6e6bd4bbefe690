//! Shared request budget for one external endpoint.
//!
//! Every adapter talking to the same venue (or site) holds the same
//! `Arc<RateBudget>`, so the request rate against that endpoint stays under
//! the quota no matter how many workers run.

use crate::error::AcquireError;
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::trace;

/// Blocking token bucket over a `governor` direct rate limiter.
pub struct RateBudget {
    name: String,
    limiter: DefaultDirectRateLimiter,
    clock: DefaultClock,
}

impl RateBudget {
    /// Budget of `requests` per second with a burst of the same size.
    pub fn per_second(name: impl Into<String>, requests: u32) -> Result<Self, AcquireError> {
        let name = name.into();
        let n = NonZeroU32::new(requests).ok_or_else(|| {
            AcquireError::Config(format!("rate budget '{name}' must allow at least 1 request/s"))
        })?;
        Ok(Self::with_quota(name, Quota::per_second(n)))
    }

    /// One request per `period`, no burst.
    pub fn every(name: impl Into<String>, period: Duration) -> Result<Self, AcquireError> {
        let name = name.into();
        let quota = Quota::with_period(period).ok_or_else(|| {
            AcquireError::Config(format!("rate budget '{name}' needs a non-zero period"))
        })?;
        Ok(Self::with_quota(name, quota))
    }

    fn with_quota(name: String, quota: Quota) -> Self {
        Self {
            name,
            limiter: RateLimiter::direct(quota),
            clock: DefaultClock::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take one request slot without waiting.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Block the calling worker until a request slot is free.
    pub fn acquire(&self) {
        loop {
            match self.limiter.check() {
                Ok(()) => return,
                Err(not_until) => {
                    let wait = not_until.wait_time_from(self.clock.now());
                    trace!(budget = %self.name, wait_ms = wait.as_millis() as u64, "waiting for rate budget");
                    std::thread::sleep(wait.max(Duration::from_millis(1)));
                }
            }
        }
    }
}

impl fmt::Debug for RateBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateBudget")
            .field("name", &self.name)
            .field("limiter", &"DefaultDirectRateLimiter { .. }")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn zero_rate_is_rejected() {
        assert!(matches!(
            RateBudget::per_second("x", 0),
            Err(AcquireError::Config(_))
        ));
        assert!(RateBudget::every("x", Duration::ZERO).is_err());
    }

    #[test]
    fn burst_is_available_immediately() {
        let budget = RateBudget::per_second("test", 5).unwrap();
        for _ in 0..5 {
            assert!(budget.try_acquire());
        }
        assert!(!budget.try_acquire());
    }

    #[test]
    fn acquire_waits_for_replenishment() {
        let budget = RateBudget::every("test", Duration::from_millis(40)).unwrap();
        budget.acquire();
        let started = Instant::now();
        budget.acquire();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn budget_is_shared_across_threads() {
        let budget = Arc::new(RateBudget::per_second("shared", 4).unwrap());
        let taken: usize = (0..4)
            .map(|_| {
                let b = Arc::clone(&budget);
                std::thread::spawn(move || (0..3).filter(|_| b.try_acquire()).count())
            })
            .map(|h| h.join().unwrap())
            .sum();
        // 12 attempts, only the burst of 4 can succeed
        assert!(taken <= 5, "took {taken} slots");
        assert!(taken >= 4);
    }
}
