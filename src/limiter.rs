//! Token-bucket rate limiting for session requests.

use std::sync::Mutex;
use std::time::Instant;

/// A token bucket refilled continuously at `rate` tokens per second up to
/// `burst`. `allow` is non-blocking; an empty bucket is a session-fatal
/// condition for the caller, not a wait.
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    state: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

impl RateLimiter {
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            rate,
            burst: f64::from(burst),
            state: Mutex::new(Bucket {
                tokens: f64::from(burst),
                refilled_at: Instant::now(),
            }),
        }
    }

    /// Try to consume one token. Returns `false` on an empty bucket.
    pub fn allow(&self) -> bool {
        let mut bucket = self.state.lock().expect("limiter lock poisoned");

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.refilled_at = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_burst_then_empty() {
        let limiter = RateLimiter::new(10.0, 20);
        for i in 0..20 {
            assert!(limiter.allow(), "token {i} should be available");
        }
        assert!(!limiter.allow(), "bucket should be empty after the burst");
    }

    #[test]
    fn test_refills_over_time() {
        let limiter = RateLimiter::new(10.0, 20);
        while limiter.allow() {}

        std::thread::sleep(Duration::from_millis(250));
        assert!(limiter.allow(), "bucket should refill at 10 tokens/s");
    }

    #[test]
    fn test_refill_caps_at_burst() {
        let limiter = RateLimiter::new(1000.0, 5);
        std::thread::sleep(Duration::from_millis(50));
        for _ in 0..5 {
            assert!(limiter.allow());
        }
        assert!(!limiter.allow(), "refill must not exceed the burst size");
    }
}
