//! Token-bucket rate limiting, used both for politeness toward upstream
//! source domains and to keep remote model endpoints inside their quotas.

use std::sync::Mutex;
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    pub requests_per_second: f64,
    pub burst: u32,
}

impl RateLimit {
    /// Per-source politeness default: one request every two seconds, two in
    /// a burst.
    pub fn politeness() -> Self {
        Self {
            requests_per_second: 0.5,
            burst: 2,
        }
    }

    pub fn with_requests_per_second(mut self, rps: f64) -> Self {
        self.requests_per_second = rps;
        self
    }

    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            burst: 20,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    refilled_at: Instant,
}

#[derive(Debug)]
pub struct TokenBucket {
    limit: RateLimit,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            state: Mutex::new(BucketState {
                tokens: f64::from(limit.burst),
                refilled_at: Instant::now(),
            }),
        }
    }

    /// Take one token if available. Non-blocking; callers that must wait do
    /// so at their own suspension point.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        let elapsed = now.duration_since(state.refilled_at).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.limit.requests_per_second)
            .min(f64::from(self.limit.burst));
        state.refilled_at = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Seconds until a token would be available; zero when one is ready.
    pub fn wait_hint_secs(&self) -> f64 {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.tokens >= 1.0 {
            0.0
        } else {
            (1.0 - state.tokens) / self.limit.requests_per_second
        }
    }
}

/// Buckets keyed by domain or provider name.
#[derive(Debug, Default)]
pub struct RateLimitRegistry {
    buckets: DashMap<String, std::sync::Arc<TokenBucket>>,
    default_limit: RateLimit,
}

impl RateLimitRegistry {
    pub fn new(default_limit: RateLimit) -> Self {
        Self {
            buckets: DashMap::new(),
            default_limit,
        }
    }

    pub fn get_or_create(&self, key: &str) -> std::sync::Arc<TokenBucket> {
        self.buckets
            .entry(key.to_string())
            .or_insert_with(|| std::sync::Arc::new(TokenBucket::new(self.default_limit)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_then_deny() {
        let bucket = TokenBucket::new(RateLimit::politeness());
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
        assert!(bucket.wait_hint_secs() > 0.0);
    }

    #[test]
    fn high_rate_allows_many() {
        let bucket = TokenBucket::new(RateLimit::default().with_burst(100));
        let granted = (0..100).filter(|_| bucket.try_acquire()).count();
        assert_eq!(granted, 100);
    }

    #[test]
    fn registry_is_per_key() {
        let registry = RateLimitRegistry::new(RateLimit::politeness());
        let a = registry.get_or_create("example.com");
        let b = registry.get_or_create("other.net");
        assert!(a.try_acquire() && a.try_acquire());
        assert!(!a.try_acquire());
        assert!(b.try_acquire());
    }
}
