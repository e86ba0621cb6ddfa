//! The in-process document ledger: lifecycle states, transition events,
//! heartbeats, and cancellation flags.
//!
//! States move strictly forward (`pending -> tier_a_done -> tier_b_done ->
//! tier_c_done -> completed`), any live state may fail, and only an explicit
//! reprocess resets to `pending`, which preserves the event history rather
//! than erasing it.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{info, warn};

use ingest::{ExtractionState, SourceType};
use staging::FailureCause;

use crate::error::OrchestratorError;

/// One lifecycle transition, mirrored into the store's append-only log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionEvent {
    pub job_id: String,
    pub doc_id: String,
    pub from: ExtractionState,
    pub to: ExtractionState,
    pub reason: String,
    pub attempt: u32,
    pub at: DateTime<Utc>,
}

/// Ledger row for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentStatus {
    pub doc_id: String,
    pub job_id: String,
    pub source_type: SourceType,
    pub content_hash: String,
    pub state: ExtractionState,
    pub cause: Option<FailureCause>,
    pub attempt: u32,
    pub updated_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub canceled: bool,
}

/// Outcome of registering a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// New document, ready for extraction.
    Accepted,
    /// Same `doc_id` with the same `content_hash`: nothing to do.
    DuplicateNoop,
    /// Same `doc_id` with changed content: reset and re-extract.
    ContentChanged,
    /// Known content resubmitted while the document sits in `pending`
    /// (after a reprocess reset or a shed submission): queue it again.
    Requeued,
}

/// Source of truth for document lifecycle inside the process.
#[derive(Debug, Default)]
pub struct DocumentLedger {
    docs: DashMap<String, DocumentStatus>,
    events: Mutex<Vec<ExtractionEvent>>,
}

impl DocumentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document for extraction. Resubmitting an identical
    /// `(doc_id, content_hash)` pair is a no-op.
    pub fn register(
        &self,
        doc_id: &str,
        source_type: SourceType,
        content_hash: &str,
        job_id: &str,
    ) -> RegisterOutcome {
        if let Some(mut existing) = self.docs.get_mut(doc_id) {
            if existing.content_hash == content_hash {
                if existing.state == ExtractionState::Pending {
                    existing.job_id = job_id.to_string();
                    existing.updated_at = Utc::now();
                    return RegisterOutcome::Requeued;
                }
                return RegisterOutcome::DuplicateNoop;
            }
            existing.content_hash = content_hash.to_string();
            existing.state = ExtractionState::Pending;
            existing.job_id = job_id.to_string();
            existing.cause = None;
            existing.canceled = false;
            existing.attempt += 1;
            existing.updated_at = Utc::now();
            return RegisterOutcome::ContentChanged;
        }

        self.docs.insert(
            doc_id.to_string(),
            DocumentStatus {
                doc_id: doc_id.to_string(),
                job_id: job_id.to_string(),
                source_type,
                content_hash: content_hash.to_string(),
                state: ExtractionState::Pending,
                cause: None,
                attempt: 0,
                updated_at: Utc::now(),
                last_heartbeat: Utc::now(),
                canceled: false,
            },
        );
        RegisterOutcome::Accepted
    }

    /// Advance a document, enforcing the forward-only transition rules, and
    /// append the event.
    pub fn transition(
        &self,
        doc_id: &str,
        to: ExtractionState,
        reason: &str,
    ) -> Result<ExtractionEvent, OrchestratorError> {
        let mut entry = self
            .docs
            .get_mut(doc_id)
            .ok_or_else(|| OrchestratorError::UnknownDocument(doc_id.to_string()))?;

        let from = entry.state;
        if !from.can_advance_to(to) {
            return Err(OrchestratorError::InvalidState(format!(
                "{doc_id}: {from} -> {to}"
            )));
        }
        entry.state = to;
        entry.updated_at = Utc::now();
        if to == ExtractionState::Failed {
            warn!(doc_id, %from, %to, reason, "document failed");
        } else {
            info!(doc_id, %from, %to, "document advanced");
        }

        let event = ExtractionEvent {
            job_id: entry.job_id.clone(),
            doc_id: doc_id.to_string(),
            from,
            to,
            reason: reason.to_string(),
            attempt: entry.attempt,
            at: Utc::now(),
        };
        drop(entry);
        self.push_event(event.clone());
        metrics::counter!("tessera_state_transitions_total", "to" => to.as_str()).increment(1);
        Ok(event)
    }

    /// Record the failure cause alongside the `failed` state.
    pub fn mark_failed(&self, doc_id: &str, cause: FailureCause) {
        if let Some(mut entry) = self.docs.get_mut(doc_id) {
            entry.cause = Some(cause);
        }
    }

    /// The explicit escape hatch from a terminal state: back to `pending`,
    /// history preserved, attempt counter bumped.
    pub fn reset_for_reprocess(&self, doc_id: &str) -> Result<(), OrchestratorError> {
        let mut entry = self
            .docs
            .get_mut(doc_id)
            .ok_or_else(|| OrchestratorError::UnknownDocument(doc_id.to_string()))?;
        let from = entry.state;
        entry.state = ExtractionState::Pending;
        entry.cause = None;
        entry.canceled = false;
        entry.attempt += 1;
        entry.updated_at = Utc::now();
        let event = ExtractionEvent {
            job_id: entry.job_id.clone(),
            doc_id: doc_id.to_string(),
            from,
            to: ExtractionState::Pending,
            reason: "reprocess".to_string(),
            attempt: entry.attempt,
            at: Utc::now(),
        };
        drop(entry);
        self.push_event(event);
        Ok(())
    }

    pub fn heartbeat(&self, doc_id: &str) {
        if let Some(mut entry) = self.docs.get_mut(doc_id) {
            entry.last_heartbeat = Utc::now();
        }
    }

    /// Documents whose worker has gone silent: reclaim to `pending` for a
    /// soft retry.
    pub fn reclaim_stale(&self, max_silence_secs: i64) -> Vec<String> {
        let cutoff = Utc::now() - ChronoDuration::seconds(max_silence_secs);
        let stale: Vec<String> = self
            .docs
            .iter()
            .filter(|d| {
                !d.state.is_terminal()
                    && d.state != ExtractionState::Pending
                    && d.last_heartbeat < cutoff
            })
            .map(|d| d.doc_id.clone())
            .collect();
        for doc_id in &stale {
            if let Some(mut entry) = self.docs.get_mut(doc_id) {
                warn!(doc_id, "reclaiming document with stale heartbeat");
                let from = entry.state;
                entry.state = ExtractionState::Pending;
                entry.attempt += 1;
                entry.updated_at = Utc::now();
                entry.last_heartbeat = Utc::now();
                let event = ExtractionEvent {
                    job_id: entry.job_id.clone(),
                    doc_id: doc_id.clone(),
                    from,
                    to: ExtractionState::Pending,
                    reason: "timeout_soft".to_string(),
                    attempt: entry.attempt,
                    at: Utc::now(),
                };
                drop(entry);
                self.push_event(event);
            }
        }
        stale
    }

    /// Flag a job for cancellation; workers observe it at their next
    /// suspension point.
    pub fn cancel(&self, job_id: &str) -> bool {
        let mut hit = false;
        for mut entry in self.docs.iter_mut() {
            if entry.job_id == job_id && !entry.state.is_terminal() {
                entry.canceled = true;
                hit = true;
            }
        }
        hit
    }

    pub fn is_canceled(&self, doc_id: &str) -> bool {
        self.docs.get(doc_id).map(|d| d.canceled).unwrap_or(false)
    }

    pub fn get(&self, doc_id: &str) -> Option<DocumentStatus> {
        self.docs.get(doc_id).map(|d| d.value().clone())
    }

    /// Paginated listing with optional state and source filters, newest
    /// first.
    pub fn list(
        &self,
        state: Option<ExtractionState>,
        source_type: Option<SourceType>,
        limit: usize,
        offset: usize,
    ) -> Vec<DocumentStatus> {
        let mut rows: Vec<DocumentStatus> = self
            .docs
            .iter()
            .filter(|d| state.map_or(true, |s| d.state == s))
            .filter(|d| source_type.map_or(true, |s| d.source_type == s))
            .map(|d| d.value().clone())
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.doc_id.cmp(&b.doc_id)));
        rows.into_iter().skip(offset).take(limit).collect()
    }

    /// Documents whose content hash is older than `since` and eligible for a
    /// reprocess sweep.
    pub fn doc_ids_updated_since(&self, since: DateTime<Utc>) -> Vec<String> {
        self.docs
            .iter()
            .filter(|d| d.updated_at >= since)
            .map(|d| d.doc_id.clone())
            .collect()
    }

    pub fn counts_by_state(&self) -> Vec<(ExtractionState, usize)> {
        use ExtractionState::*;
        [Pending, TierADone, TierBDone, TierCDone, Completed, Failed]
            .into_iter()
            .map(|s| (s, self.docs.iter().filter(|d| d.state == s).count()))
            .collect()
    }

    pub fn counts_by_cause(&self) -> Vec<(FailureCause, usize)> {
        let mut counts: std::collections::BTreeMap<&'static str, (FailureCause, usize)> =
            std::collections::BTreeMap::new();
        for doc in self.docs.iter() {
            if let Some(cause) = doc.cause {
                counts.entry(cause.as_str()).or_insert((cause, 0)).1 += 1;
            }
        }
        counts.into_values().collect()
    }

    pub fn in_flight(&self) -> usize {
        self.docs
            .iter()
            .filter(|d| !d.state.is_terminal())
            .count()
    }

    pub fn events_for(&self, doc_id: &str) -> Vec<ExtractionEvent> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|e| e.doc_id == doc_id)
            .cloned()
            .collect()
    }

    fn push_event(&self, event: ExtractionEvent) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
    }
}
