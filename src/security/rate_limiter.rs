//! Accept-time admission control: a token bucket with burst = 2x the
//! configured per-second rate, shared by every accepted connection.

use std::num::NonZeroU32;

use governor::{Quota, RateLimiter as GovernorLimiter};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use nonzero_ext::nonzero;

pub struct RateLimiter {
    inner: GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl RateLimiter {
    pub fn new(per_second: u32) -> Self {
        let rate = NonZeroU32::new(per_second).unwrap_or(nonzero!(1u32));
        let burst = NonZeroU32::new(per_second.saturating_mul(2)).unwrap_or(rate);
        let quota = Quota::per_second(rate).allow_burst(burst);

        Self {
            inner: GovernorLimiter::direct(quota),
        }
    }

    /// Attempts to dequeue one token. Returns `false` (and does not block)
    /// when the bucket is empty.
    pub fn try_acquire(&self) -> bool {
        self.inner.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_allows_twice_the_configured_rate_up_front() {
        let limiter = RateLimiter::new(5);
        let mut accepted = 0;
        for _ in 0..20 {
            if limiter.try_acquire() {
                accepted += 1;
            }
        }
        // burst = 2x rate = 10 tokens available before the bucket empties
        assert_eq!(accepted, 10);
    }

    #[test]
    fn exhausted_bucket_rejects_further_requests() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
