//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Paces state updates sent to one viewer
#[derive(Clone)]
pub struct ViewerRateLimiter {
    output_limiter: Arc<Limiter>,
}

impl ViewerRateLimiter {
    pub fn new(updates_per_second: u32) -> Self {
        Self {
            output_limiter: create_limiter(updates_per_second),
        }
    }

    /// Wait until the next update may be sent
    pub async fn ready(&self) {
        self.output_limiter.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn limits_burst_to_quota() {
        let limiter = create_limiter(2);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn zero_rate_falls_back_to_one() {
        let limiter = create_limiter(0);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[tokio::test]
    async fn ready_paces_updates() {
        let limiter = ViewerRateLimiter::new(10);
        let started = Instant::now();
        for _ in 0..13 {
            limiter.ready().await;
        }
        // Burst of 10, then roughly 100ms per update
        assert!(started.elapsed() >= Duration::from_millis(250));
    }
}
