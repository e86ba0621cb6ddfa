//! Bounded, deterministic backoff schedules.
//!
//! Two ladders exist in the pipeline: the in-component retry for remote
//! calls (base 1 s, factor 2) and the slower dead-letter redrive ladder
//! (1 s, 5 s, 25 s). Both cap attempts at three and spread load with
//! ±25% jitter.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: f64,
    pub max_attempts: u32,
    pub jitter: bool,
}

impl BackoffPolicy {
    /// Remote-call retry: 1 s, 2 s, 4 s.
    pub fn remote_call() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2.0,
            max_attempts: 3,
            jitter: true,
        }
    }

    /// Dead-letter redrive: 1 s, 5 s, 25 s.
    pub fn dead_letter() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 5.0,
            max_attempts: 3,
            jitter: true,
        }
    }

    pub fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (1-indexed; attempt 0 means the
    /// first try and waits nothing).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exact = self.base.as_millis() as f64 * self.factor.powi(attempt as i32 - 1);
        let millis = exact.min(u64::MAX as f64) as u64;
        if !self.jitter {
            return Duration::from_millis(millis);
        }

        // ±25%, seeded from the wall clock's sub-second noise.
        let spread = millis / 4;
        if spread == 0 {
            return Duration::from_millis(millis);
        }
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as u64;
        let offset = nanos % (spread * 2);
        Duration::from_millis(millis - spread + offset)
    }

    pub fn attempts_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}
