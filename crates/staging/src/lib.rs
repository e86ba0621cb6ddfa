//! Tessera Staging Layer
//!
//! The pipeline's memory of what already happened and what went wrong:
//!
//! - **Extraction cache** - content-hash keyed, version-stamped, TTL-bound.
//!   Used by the linguistic tier for window-level results and by the
//!   structured extractor for model outputs. Tolerates total loss.
//! - **Dead-letter queue** - failed documents and windows with cause codes,
//!   attempt counters, bounded redrive, and a 30-day quarantine.
//! - **Resilience primitives** - the backoff ladders, bounded retry
//!   executor, per-provider circuit breakers, and token buckets every
//!   remote-facing component shares.
//!
//! Nothing in this crate is a source of truth; it can all be wiped without
//! data loss, only wasted work.

mod backoff;
mod bucket;
mod cache;
mod cause;
mod circuit;
mod dlq;
mod retry;

pub use backoff::BackoffPolicy;
pub use bucket::{RateLimit, RateLimitRegistry, TokenBucket};
pub use cache::{cache_key, CacheEntry, CacheStats, ExtractionCache, DEFAULT_TTL};
pub use cause::FailureCause;
pub use circuit::{CircuitBreaker, CircuitBreakerRegistry, CircuitConfig, CircuitState};
pub use dlq::{DeadLetter, DeadLetterQueue, DlqDepths, UnitKind};
pub use retry::{is_retryable_error, run_with_retry, RetryOutcome};
