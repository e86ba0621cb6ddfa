//! Tessera Extraction Orchestrator
//!
//! Drives each document through the tier cascade: deterministic extraction,
//! linguistic extraction, structured extraction over the selected windows,
//! entity resolution, then the graph and vector writes. Tiers are strictly
//! ordered within a document; documents run concurrently on a bounded
//! worker pool fed by an in-process queue.
//!
//! The ledger in [`state`] is the source of truth for lifecycle: forward-only
//! transitions, an append-only event trail, heartbeats with stale-worker
//! reclamation, and cancellation flags observed at suspension points. The
//! chunk/embed/vector path runs alongside extraction for each document; a
//! failure on either path fails the document with its cause code.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use graphstore::{GraphWriter, WriteReport};
use ingest::{accept_document, chunk_document, ExtractionState, IngestConfig, NormalizedDocument};
use inference::TierCExtractor;
use staging::{DeadLetterQueue, FailureCause, RateLimit, RateLimitRegistry, UnitKind};
use vectorstore::{EmbedClient, EmbeddedChunk, VectorCollection};

mod error;
pub mod resolve;
pub mod state;

pub use error::OrchestratorError;
pub use resolve::{canonical_key, resolve_packets, ResolvedGraph};
pub use state::{DocumentLedger, DocumentStatus, ExtractionEvent, RegisterOutcome};

/// Orchestrator knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Concurrent document workers.
    pub workers: usize,
    /// Hard cap on admitted, unfinished documents; submissions beyond it are
    /// shed with [`OrchestratorError::Saturated`].
    pub in_flight_cap: usize,
    /// Per-document wall clock.
    pub doc_timeout_secs: u64,
    /// Worker liveness beat interval.
    pub heartbeat_secs: u64,
    /// Reclaim documents silent for longer than this.
    pub reclaim_after_secs: u64,
    /// Vector namespace stamped on every chunk payload.
    pub namespace: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            in_flight_cap: 32,
            doc_timeout_secs: 300,
            heartbeat_secs: 10,
            reclaim_after_secs: 90,
            namespace: "default".into(),
        }
    }
}

/// Per-document processing summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessReport {
    pub doc_id: String,
    pub nodes_written: usize,
    pub edges_written: usize,
    pub chunks_written: usize,
    pub windows_processed: usize,
    pub cache_hits: usize,
    pub dropped_below_threshold: usize,
}

/// What happened to one submitted document.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    Completed(ProcessReport),
    /// Identical `(doc_id, content_hash)` was already processed.
    Skipped,
    Canceled,
}

/// Everything the orchestrator needs handles to.
pub struct Orchestrator {
    ledger: Arc<DocumentLedger>,
    dlq: Arc<DeadLetterQueue>,
    tier_c: Arc<TierCExtractor>,
    writer: Arc<GraphWriter>,
    embedder: Arc<EmbedClient>,
    collection: Arc<VectorCollection>,
    politeness: RateLimitRegistry,
    ingest_cfg: IngestConfig,
    tier_a_cfg: deterministic::DeterministicConfig,
    tier_b_cfg: linguistic::LinguisticConfig,
    cfg: OrchestratorConfig,
    queue_tx: mpsc::UnboundedSender<NormalizedDocument>,
    queue_rx: Mutex<mpsc::UnboundedReceiver<NormalizedDocument>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<DocumentLedger>,
        dlq: Arc<DeadLetterQueue>,
        tier_c: Arc<TierCExtractor>,
        writer: Arc<GraphWriter>,
        embedder: Arc<EmbedClient>,
        collection: Arc<VectorCollection>,
        ingest_cfg: IngestConfig,
        tier_a_cfg: deterministic::DeterministicConfig,
        tier_b_cfg: linguistic::LinguisticConfig,
        cfg: OrchestratorConfig,
    ) -> Self {
        // The channel itself is unbounded; admission control happens against
        // the ledger's in-flight count so shed submissions never deadlock a
        // caller that also drives the queue.
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            ledger,
            dlq,
            tier_c,
            writer,
            embedder,
            collection,
            politeness: RateLimitRegistry::new(RateLimit::politeness()),
            ingest_cfg,
            tier_a_cfg,
            tier_b_cfg,
            cfg,
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
        }
    }

    pub fn ledger(&self) -> Arc<DocumentLedger> {
        self.ledger.clone()
    }

    /// Enqueue a document for the worker pool. Sheds load beyond the
    /// in-flight cap. Returns the job id.
    pub async fn submit(&self, doc: NormalizedDocument) -> Result<String, OrchestratorError> {
        if self.ledger.in_flight() >= self.cfg.in_flight_cap {
            return Err(OrchestratorError::Saturated(self.cfg.in_flight_cap));
        }
        let doc = accept_document(doc, &self.ingest_cfg)?;
        let job_id = Uuid::new_v4().to_string();
        match self
            .ledger
            .register(&doc.doc_id, doc.source_type, &doc.content_hash, &job_id)
        {
            RegisterOutcome::DuplicateNoop => {
                info!(doc_id = %doc.doc_id, "duplicate submission, nothing to do");
                return Ok(job_id);
            }
            RegisterOutcome::Accepted
            | RegisterOutcome::ContentChanged
            | RegisterOutcome::Requeued => {}
        }
        self.queue_tx
            .send(doc)
            .map_err(|_| OrchestratorError::Saturated(self.cfg.in_flight_cap))?;
        Ok(job_id)
    }

    /// Run worker tasks until the queue closes and drains. Suitable for the
    /// `extract pending` CLI path; the server keeps the queue open instead.
    pub async fn run_until_drained(self: &Arc<Self>) {
        let mut workers = Vec::with_capacity(self.cfg.workers.max(1));
        for worker_id in 0..self.cfg.workers.max(1) {
            let orchestrator = self.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let doc = {
                        let mut rx = orchestrator.queue_rx.lock().await;
                        match rx.try_recv() {
                            Ok(doc) => doc,
                            Err(mpsc::error::TryRecvError::Empty) => break,
                            Err(mpsc::error::TryRecvError::Disconnected) => break,
                        }
                    };
                    let doc_id = doc.doc_id.clone();
                    let span = info_span!("ingest.doc", worker_id, doc_id = %doc_id);
                    if let Err(err) = orchestrator.process_document(doc).instrument(span).await {
                        warn!(doc_id, error = %err, "document processing failed");
                    }
                }
            }));
        }
        for worker in workers {
            let _ = worker.await;
        }
    }

    /// Reset documents touched since `since` back to `pending` and requeue
    /// them. The caller resubmits content through `submit`; this only flips
    /// ledger state.
    pub fn reprocess_since(&self, since: chrono::DateTime<chrono::Utc>) -> Vec<String> {
        let doc_ids = self.ledger.doc_ids_updated_since(since);
        for doc_id in &doc_ids {
            if let Err(err) = self.ledger.reset_for_reprocess(doc_id) {
                warn!(doc_id, error = %err, "reprocess reset failed");
            }
        }
        doc_ids
    }

    /// Cancel a job at the next suspension point.
    pub fn cancel(&self, job_id: &str) -> bool {
        self.ledger.cancel(job_id)
    }

    /// Reclaim documents whose workers went silent.
    pub fn reclaim_stale(&self) -> Vec<String> {
        self.ledger.reclaim_stale(self.cfg.reclaim_after_secs as i64)
    }

    /// Drain dead letters whose backoff has elapsed and mark their documents
    /// `pending` again, so the next submission or extraction sweep re-drives
    /// them through the appropriate tier.
    pub fn redrive_dead_letters(&self) -> usize {
        let due = self.dlq.reap_due();
        let mut redriven = 0usize;
        for letter in due {
            // Window keys are `doc_id#w<ordinal>`; everything before the
            // marker names the owning document.
            let doc_id = letter.key.split("#w").next().unwrap_or(&letter.key);
            if self.ledger.get(doc_id).is_some() {
                if let Err(err) = self.ledger.reset_for_reprocess(doc_id) {
                    warn!(doc_id, error = %err, "dead letter redrive failed");
                    continue;
                }
                redriven += 1;
            }
        }
        if redriven > 0 {
            info!(redriven, "dead letters redriven to pending");
        }
        redriven
    }

    /// Periodic upkeep: stale-worker reclamation, dead-letter redrive, and
    /// quarantine retention. Intended for a background interval task.
    pub fn maintain(&self) {
        let reclaimed = self.reclaim_stale();
        let redriven = self.redrive_dead_letters();
        let purged = self.dlq.purge_expired();
        if !reclaimed.is_empty() || redriven > 0 || purged > 0 {
            info!(
                reclaimed = reclaimed.len(),
                redriven, purged, "orchestrator maintenance pass"
            );
        }
    }

    /// Drive one document through every tier and both write paths.
    pub async fn process_document(
        &self,
        doc: NormalizedDocument,
    ) -> Result<ProcessOutcome, OrchestratorError> {
        let budget = Duration::from_secs(self.cfg.doc_timeout_secs);
        let doc_id = doc.doc_id.clone();

        let heartbeat = self.spawn_heartbeat(doc_id.clone());
        let result = timeout(budget, self.process_inner(doc)).await;
        heartbeat.abort();

        match result {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(err)) => {
                self.fail_document(&doc_id, err.cause(), &err.to_string()).await;
                Err(err)
            }
            Err(_) => {
                let err = OrchestratorError::Timeout(self.cfg.doc_timeout_secs);
                self.fail_document(&doc_id, FailureCause::Timeout, &err.to_string()).await;
                Err(err)
            }
        }
    }

    async fn process_inner(
        &self,
        doc: NormalizedDocument,
    ) -> Result<ProcessOutcome, OrchestratorError> {
        let doc_id = doc.doc_id.clone();
        let mut report = ProcessReport {
            doc_id: doc_id.clone(),
            ..ProcessReport::default()
        };

        // Politeness toward the source domain before any tier-A work that
        // might touch referenced content.
        if let Some(domain) = source_domain(&doc) {
            let bucket = self.politeness.get_or_create(&domain);
            if !bucket.try_acquire() {
                let wait = bucket.wait_hint_secs();
                tokio::time::sleep(Duration::from_secs_f64(wait.min(10.0))).await;
            }
        }

        // The retrieval path (chunk -> embed -> vector upsert) and the graph
        // path share no state; run them side by side.
        let vector_path = self.vector_path(&doc);
        let graph_path = self.graph_path(&doc, &mut report);
        let (chunks_written, graph_result) = tokio::join!(vector_path, graph_path);
        report.chunks_written = chunks_written?;
        let write_report = match graph_result? {
            Some(write_report) => write_report,
            None => return Ok(ProcessOutcome::Canceled),
        };
        report.nodes_written = write_report.nodes_written;
        report.edges_written = write_report.edges_written;

        self.advance(&doc_id, ExtractionState::Completed, "finalize").await?;
        info!(
            doc_id,
            nodes = report.nodes_written,
            edges = report.edges_written,
            chunks = report.chunks_written,
            "document completed"
        );
        Ok(ProcessOutcome::Completed(report))
    }

    /// Chunk, embed, and upsert the retrieval-side representation.
    async fn vector_path(&self, doc: &NormalizedDocument) -> Result<usize, OrchestratorError> {
        let chunks = chunk_document(doc, &self.ingest_cfg);
        if chunks.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let embedded: Vec<EmbeddedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk {
                chunk,
                vector,
                source_type: doc.source_type,
                ingested_at: doc.ingested_at,
                namespace: self.cfg.namespace.clone(),
                tags: Vec::new(),
            })
            .collect();
        let written = self.collection.upsert_chunks(&embedded).await?;
        Ok(written)
    }

    /// The tier cascade plus resolution and the graph write. Returns `None`
    /// when the document was canceled mid-flight.
    async fn graph_path(
        &self,
        doc: &NormalizedDocument,
        report: &mut ProcessReport,
    ) -> Result<Option<WriteReport>, OrchestratorError> {
        let doc_id = &doc.doc_id;

        // Tier A.
        let tier_a = {
            let span = info_span!("extract.tier_a", doc_id = %doc_id);
            let _guard = span.enter();
            deterministic::extract(doc, &self.tier_a_cfg)?
        };
        self.advance(doc_id, ExtractionState::TierADone, "tier_a").await?;
        if self.ledger.is_canceled(doc_id) {
            return Ok(None);
        }

        // Tier B.
        let tier_b = {
            let span = info_span!("extract.tier_b", doc_id = %doc_id);
            let _guard = span.enter();
            linguistic::extract(doc, &self.tier_b_cfg)
        };
        self.advance(doc_id, ExtractionState::TierBDone, "tier_b").await?;
        if self.ledger.is_canceled(doc_id) {
            return Ok(None);
        }

        // Tier C over the selected windows.
        let tier_c = self
            .tier_c
            .extract_windows(doc_id, &tier_b.windows, doc.ingested_at)
            .instrument(info_span!("extract.tier_c", doc_id = %doc_id))
            .await;
        report.windows_processed = tier_c.report.windows_total;
        report.cache_hits = tier_c.report.cache_hits;
        let tier_c_failed_document =
            tier_c.report.windows_total > 0 && tier_c.report.dead_lettered == tier_c.report.windows_total;
        self.advance(doc_id, ExtractionState::TierCDone, "tier_c").await?;
        if self.ledger.is_canceled(doc_id) {
            return Ok(None);
        }
        if tier_c_failed_document {
            // Every window died; there is nothing trustworthy to write.
            return Err(OrchestratorError::InvalidState(format!(
                "{doc_id}: all {} windows dead-lettered",
                tier_c.report.windows_total
            )));
        }

        // Merge the tiers and write.
        let resolved = resolve_packets(vec![tier_a.packet, tier_b.packet, tier_c.packet]);
        report.dropped_below_threshold = resolved.dropped_below_threshold;

        let span = info_span!("graph.write", doc_id = %doc_id);
        let mut write_report = self
            .writer
            .upsert_nodes(&resolved.nodes)
            .instrument(span.clone())
            .await?;
        let edge_report = self
            .writer
            .upsert_edges(&resolved.edges)
            .instrument(span)
            .await?;
        write_report.edges_written = edge_report.edges_written;
        write_report.rows_quarantined += edge_report.rows_quarantined;

        // Supersede contributions left behind by older extractor versions.
        let keep = [
            deterministic::EXTRACTOR_VERSION,
            linguistic::EXTRACTOR_VERSION,
            inference::EXTRACTOR_VERSION,
        ];
        self.writer.supersede_document(doc_id, &keep).await?;

        Ok(Some(write_report))
    }

    async fn advance(
        &self,
        doc_id: &str,
        to: ExtractionState,
        reason: &str,
    ) -> Result<(), OrchestratorError> {
        let event = self.ledger.transition(doc_id, to, reason)?;
        // The store-side event log is best effort; the in-process ledger is
        // authoritative for lifecycle decisions.
        if let Err(err) = self
            .writer
            .record_event(
                &event.job_id,
                doc_id,
                event.from.as_str(),
                event.to.as_str(),
                reason,
                event.attempt,
            )
            .await
        {
            warn!(doc_id, error = %err, "event log write failed");
        }
        Ok(())
    }

    async fn fail_document(&self, doc_id: &str, cause: FailureCause, reason: &str) {
        self.ledger.mark_failed(doc_id, cause);
        if let Err(err) = self
            .ledger
            .transition(doc_id, ExtractionState::Failed, reason)
        {
            warn!(doc_id, error = %err, "failure transition rejected");
            return;
        }
        self.dlq.push(doc_id, reason, UnitKind::Document, cause);
        metrics::counter!("tessera_documents_failed_total", "cause" => cause.as_str())
            .increment(1);
    }

    fn spawn_heartbeat(&self, doc_id: String) -> tokio::task::JoinHandle<()> {
        let ledger = self.ledger.clone();
        let interval = Duration::from_secs(self.cfg.heartbeat_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                ledger.heartbeat(&doc_id);
            }
        })
    }
}

/// Domain component of the document's source URL, used as the politeness
/// bucket key.
fn source_domain(doc: &NormalizedDocument) -> Option<String> {
    let url = doc.source_url.as_deref()?;
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let host = rest.split(['/', ':', '?']).next()?;
    (!host.is_empty()).then(|| host.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ingest::SourceType;

    fn doc_with_url(url: Option<&str>) -> NormalizedDocument {
        NormalizedDocument {
            doc_id: "doc-1".into(),
            source_type: SourceType::Web,
            source_url: url.map(String::from),
            ingested_at: Utc::now(),
            content_hash: ingest::hash::content_hash("text"),
            text: "text".into(),
            sub_structures: Vec::new(),
        }
    }

    #[test]
    fn source_domain_extraction() {
        assert_eq!(
            source_domain(&doc_with_url(Some("https://Docs.Example.com/a/b?q=1"))),
            Some("docs.example.com".to_string())
        );
        assert_eq!(
            source_domain(&doc_with_url(Some("http://10.0.0.1:8080/x"))),
            Some("10.0.0.1".to_string())
        );
        assert_eq!(source_domain(&doc_with_url(None)), None);
        assert_eq!(source_domain(&doc_with_url(Some("ftp://nope"))), None);
    }

    #[test]
    fn config_defaults_match_contract() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.doc_timeout_secs, 300);
        assert_eq!(cfg.heartbeat_secs, 10);
        assert_eq!(cfg.reclaim_after_secs, 90);
    }
}
