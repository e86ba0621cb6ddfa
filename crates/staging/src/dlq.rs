//! Dead-letter queue for failed extraction units.
//!
//! Failed documents and windows land in `pending` with a cause code and an
//! attempt counter. A scheduled reaper drains entries whose backoff has
//! elapsed and feeds them back to the owning tier; after the attempt budget
//! is spent the entry moves to `failed`, where it is kept for a retention
//! window for operator inspection and then reaped for good.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backoff::BackoffPolicy;
use crate::cause::FailureCause;

/// What kind of work unit an entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Document,
    Window,
}

/// One failed unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub key: String,
    /// First bytes of the failing payload, enough to recognize it.
    pub payload_head: String,
    pub kind: UnitKind,
    pub cause: FailureCause,
    pub attempts: u32,
    pub first_seen: DateTime<Utc>,
    pub last_attempt: DateTime<Utc>,
}

/// How many bytes of payload to keep on the entry.
const PAYLOAD_HEAD_BYTES: usize = 256;

/// How long exhausted entries stay inspectable.
const FAILED_RETENTION_DAYS: i64 = 30;

/// Queue depths for status output and metrics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DlqDepths {
    pub pending: usize,
    pub failed: usize,
}

pub struct DeadLetterQueue {
    pending: DashMap<String, DeadLetter>,
    failed: DashMap<String, DeadLetter>,
    policy: BackoffPolicy,
}

impl DeadLetterQueue {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            pending: DashMap::new(),
            failed: DashMap::new(),
            policy,
        }
    }

    /// Record a failure. A unit already pending has its attempt counter
    /// bumped; once the budget is exhausted the entry is moved to `failed`.
    /// Permanent causes skip the retry ladder entirely.
    pub fn push(&self, key: &str, payload: &str, kind: UnitKind, cause: FailureCause) {
        let now = Utc::now();
        let mut entry = match self.pending.remove(key) {
            Some((_, mut existing)) => {
                existing.attempts += 1;
                existing.last_attempt = now;
                existing.cause = cause;
                existing
            }
            None => DeadLetter {
                key: key.to_string(),
                payload_head: head(payload),
                kind,
                cause,
                attempts: 1,
                first_seen: now,
                last_attempt: now,
            },
        };

        let exhausted = self.policy.attempts_exhausted(entry.attempts);
        let permanent = !cause.is_transient(entry.attempts.saturating_sub(1));
        if exhausted || permanent {
            warn!(
                key = %entry.key,
                cause = %entry.cause,
                attempts = entry.attempts,
                permanent,
                "dead letter exhausted, quarantining"
            );
            entry.last_attempt = now;
            self.failed.insert(entry.key.clone(), entry);
        } else {
            info!(
                key = %entry.key,
                cause = %entry.cause,
                attempts = entry.attempts,
                "dead letter queued for retry"
            );
            self.pending.insert(entry.key.clone(), entry);
        }
    }

    /// Drain every pending entry whose backoff has elapsed. The caller owns
    /// re-driving the returned units through the appropriate tier.
    pub fn reap_due(&self) -> Vec<DeadLetter> {
        let now = Utc::now();
        let due_keys: Vec<String> = self
            .pending
            .iter()
            .filter(|entry| {
                let delay = self.policy.delay_for(entry.attempts);
                let due_at = entry.last_attempt
                    + ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::zero());
                due_at <= now
            })
            .map(|entry| entry.key.clone())
            .collect();

        due_keys
            .into_iter()
            .filter_map(|key| self.pending.remove(&key).map(|(_, v)| v))
            .collect()
    }

    /// Drop quarantined entries older than the retention window.
    pub fn purge_expired(&self) -> usize {
        let cutoff = Utc::now() - ChronoDuration::days(FAILED_RETENTION_DAYS);
        let expired: Vec<String> = self
            .failed
            .iter()
            .filter(|e| e.last_attempt < cutoff)
            .map(|e| e.key.clone())
            .collect();
        let count = expired.len();
        for key in expired {
            self.failed.remove(&key);
        }
        count
    }

    /// Remove and return a unit from quarantine (admin redrive).
    pub fn take_failed(&self, key: &str) -> Option<DeadLetter> {
        self.failed.remove(key).map(|(_, v)| v)
    }

    pub fn get_failed(&self, key: &str) -> Option<DeadLetter> {
        self.failed.get(key).map(|e| e.value().clone())
    }

    pub fn failed_entries(&self) -> Vec<DeadLetter> {
        self.failed.iter().map(|e| e.value().clone()).collect()
    }

    pub fn depths(&self) -> DlqDepths {
        DlqDepths {
            pending: self.pending.len(),
            failed: self.failed.len(),
        }
    }
}

impl Default for DeadLetterQueue {
    fn default() -> Self {
        Self::new(BackoffPolicy::dead_letter())
    }
}

fn head(payload: &str) -> String {
    let mut end = payload.len().min(PAYLOAD_HEAD_BYTES);
    while end > 0 && !payload.is_char_boundary(end) {
        end -= 1;
    }
    payload[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_queue() -> DeadLetterQueue {
        DeadLetterQueue::new(
            BackoffPolicy::dead_letter()
                .with_base(Duration::ZERO)
                .with_jitter(false),
        )
    }

    #[test]
    fn transient_failure_is_pending() {
        let dlq = fast_queue();
        dlq.push("win-1", "some window text", UnitKind::Window, FailureCause::Timeout);
        let depths = dlq.depths();
        assert_eq!(depths.pending, 1);
        assert_eq!(depths.failed, 0);
    }

    #[test]
    fn permanent_failure_goes_straight_to_failed() {
        let dlq = fast_queue();
        dlq.push("doc-1", "blocked", UnitKind::Document, FailureCause::Waf);
        let depths = dlq.depths();
        assert_eq!(depths.pending, 0);
        assert_eq!(depths.failed, 1);
    }

    #[test]
    fn third_attempt_exhausts_budget() {
        let dlq = fast_queue();
        for _ in 0..2 {
            dlq.push("win-1", "text", UnitKind::Window, FailureCause::Timeout);
        }
        assert_eq!(dlq.depths().pending, 1);
        dlq.push("win-1", "text", UnitKind::Window, FailureCause::Timeout);
        assert_eq!(dlq.depths().pending, 0);
        let entry = dlq.get_failed("win-1").expect("quarantined");
        assert_eq!(entry.attempts, 3);
    }

    #[test]
    fn llm_format_twice_then_quarantined() {
        let dlq = fast_queue();
        dlq.push("win-9", "{not json", UnitKind::Window, FailureCause::LlmFormat);
        assert_eq!(dlq.depths().pending, 1);
        dlq.push("win-9", "{not json", UnitKind::Window, FailureCause::LlmFormat);
        assert_eq!(dlq.depths().pending, 0);
        let entry = dlq.get_failed("win-9").expect("quarantined");
        assert_eq!(entry.attempts, 2);
        assert_eq!(entry.cause, FailureCause::LlmFormat);
    }

    #[test]
    fn reap_returns_due_entries() {
        let dlq = fast_queue();
        dlq.push("win-1", "text", UnitKind::Window, FailureCause::Timeout);
        let due = dlq.reap_due();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].key, "win-1");
        assert_eq!(dlq.depths().pending, 0);
    }

    #[test]
    fn unexpired_entries_not_reaped() {
        let dlq = DeadLetterQueue::default();
        dlq.push("win-1", "text", UnitKind::Window, FailureCause::Timeout);
        assert!(dlq.reap_due().is_empty());
        assert_eq!(dlq.depths().pending, 1);
    }

    #[test]
    fn payload_head_is_truncated() {
        let dlq = fast_queue();
        let long = "x".repeat(10_000);
        dlq.push("doc-1", &long, UnitKind::Document, FailureCause::Waf);
        let entry = dlq.get_failed("doc-1").unwrap();
        assert_eq!(entry.payload_head.len(), 256);
    }
}
