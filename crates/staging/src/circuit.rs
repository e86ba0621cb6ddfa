//! Circuit breaker for remote model and store endpoints.
//!
//! One breaker per provider, managed behind a concurrent map. A run of
//! failures opens the circuit and requests fail fast until the reset window
//! passes; a probe period (half-open) requires consecutive successes before
//! traffic resumes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircuitConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

impl CircuitConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitConfig,
    state: Mutex<CircuitState>,
    failures: AtomicU64,
    successes: AtomicU64,
    opened_at: Mutex<Instant>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CircuitState::Closed),
            failures: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            opened_at: Mutex::new(Instant::now()),
        }
    }

    pub fn allow_request(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        match *state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let opened = *self.opened_at.lock().unwrap_or_else(|p| p.into_inner());
                if opened.elapsed() >= self.config.reset_timeout {
                    *state = CircuitState::HalfOpen;
                    self.successes.store(0, Ordering::SeqCst);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        match *state {
            CircuitState::HalfOpen => {
                let n = self.successes.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= u64::from(self.config.success_threshold) {
                    *state = CircuitState::Closed;
                    self.failures.store(0, Ordering::SeqCst);
                }
            }
            CircuitState::Closed => {
                self.failures.store(0, Ordering::SeqCst);
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        match *state {
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                *self.opened_at.lock().unwrap_or_else(|p| p.into_inner()) = Instant::now();
            }
            CircuitState::Closed => {
                let n = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= u64::from(self.config.failure_threshold) {
                    *state = CircuitState::Open;
                    *self.opened_at.lock().unwrap_or_else(|p| p.into_inner()) = Instant::now();
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn current_state(&self) -> CircuitState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }
}

/// One breaker per named provider.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
        }
    }

    pub fn get_or_create(&self, provider: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.default_config)))
            .clone()
    }

    pub fn is_healthy(&self, provider: &str) -> bool {
        self.breakers
            .get(provider)
            .map(|b| b.current_state() != CircuitState::Open)
            .unwrap_or(true)
    }

    pub fn snapshot(&self) -> Vec<(String, CircuitState, u64)> {
        self.breakers
            .iter()
            .map(|e| (e.key().clone(), e.current_state(), e.failure_count()))
            .collect()
    }

    pub fn reset_all(&self) {
        self.breakers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold() {
        let cb = CircuitBreaker::new(CircuitConfig::default().with_failure_threshold(3));
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.current_state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.current_state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn recovers_through_half_open() {
        let cb = CircuitBreaker::new(
            CircuitConfig::default()
                .with_failure_threshold(1)
                .with_reset_timeout(Duration::ZERO)
                .with_success_threshold(2),
        );
        cb.record_failure();
        assert_eq!(cb.current_state(), CircuitState::Open);

        assert!(cb.allow_request());
        assert_eq!(cb.current_state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.current_state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.current_state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new(
            CircuitConfig::default()
                .with_failure_threshold(1)
                .with_reset_timeout(Duration::ZERO),
        );
        cb.record_failure();
        assert!(cb.allow_request());
        cb.record_failure();
        assert_eq!(cb.current_state(), CircuitState::Open);
    }

    #[test]
    fn success_in_closed_resets_count() {
        let cb = CircuitBreaker::new(CircuitConfig::default().with_failure_threshold(3));
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.current_state(), CircuitState::Closed);
    }

    #[test]
    fn registry_tracks_providers() {
        let registry = CircuitBreakerRegistry::default();
        let cb = registry.get_or_create("embedder");
        assert!(registry.is_healthy("embedder"));
        for _ in 0..5 {
            cb.record_failure();
        }
        assert!(!registry.is_healthy("embedder"));
        assert!(registry.is_healthy("never-seen"));
    }
}
