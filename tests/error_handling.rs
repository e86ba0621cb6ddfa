//! Failure-path behavior: cause taxonomy, dead-letter flow, state machine
//! rejection of illegal transitions, and malformed model output handling.

use std::str::FromStr;

use tessera::inference::WireExtraction;
use tessera::ingest::{accept_document, hash::content_hash, ExtractionState, IngestConfig, NormalizedDocument, SourceType};
use tessera::orchestrator::{DocumentLedger, RegisterOutcome};
use tessera::staging::{BackoffPolicy, DeadLetterQueue, FailureCause, UnitKind};

#[test]
fn transient_and_permanent_causes_split_correctly() {
    // Transient: retried through the ladder.
    for cause in [
        FailureCause::Timeout,
        FailureCause::RateLimited,
        FailureCause::OriginError,
        FailureCause::GraphWrite,
        FailureCause::VectorWrite,
    ] {
        assert!(cause.is_transient(0), "{cause} should retry");
    }
    // Permanent: documents fail immediately.
    for cause in [
        FailureCause::UrlBad,
        FailureCause::Robots,
        FailureCause::Waf,
        FailureCause::Parse,
    ] {
        assert!(!cause.is_transient(0), "{cause} should not retry");
    }
    // Format failures get exactly one more chance.
    assert!(FailureCause::LlmFormat.is_transient(0));
    assert!(!FailureCause::LlmFormat.is_transient(1));
}

#[test]
fn double_llm_format_failure_quarantines_with_two_attempts() {
    let dlq = DeadLetterQueue::new(
        BackoffPolicy::dead_letter()
            .with_base(std::time::Duration::ZERO)
            .with_jitter(false),
    );

    // First malformed response: pending retry.
    dlq.push("doc-x#w0", "not json at all", UnitKind::Window, FailureCause::LlmFormat);
    assert_eq!(dlq.depths().pending, 1);
    assert_eq!(dlq.depths().failed, 0);

    // Second malformed response: quarantined for good.
    dlq.push("doc-x#w0", "not json at all", UnitKind::Window, FailureCause::LlmFormat);
    assert_eq!(dlq.depths().pending, 0);
    assert_eq!(dlq.depths().failed, 1);

    let entry = dlq.get_failed("doc-x#w0").expect("quarantined window");
    assert_eq!(entry.attempts, 2);
    assert_eq!(entry.cause, FailureCause::LlmFormat);
    assert_eq!(entry.kind, UnitKind::Window);
}

#[test]
fn reaped_entries_leave_pending() {
    let dlq = DeadLetterQueue::new(
        BackoffPolicy::dead_letter()
            .with_base(std::time::Duration::ZERO)
            .with_jitter(false),
    );
    dlq.push("doc-1", "payload", UnitKind::Document, FailureCause::Timeout);
    dlq.push("doc-2", "payload", UnitKind::Document, FailureCause::RateLimited);

    let due = dlq.reap_due();
    assert_eq!(due.len(), 2);
    assert_eq!(dlq.depths().pending, 0);

    let mut keys: Vec<&str> = due.iter().map(|d| d.key.as_str()).collect();
    keys.sort();
    assert_eq!(keys, vec!["doc-1", "doc-2"]);
}

#[test]
fn malformed_model_outputs_are_rejected_not_guessed() {
    for garbage in [
        "I believe the services are nginx and postgres.",
        "```json\nnot actually json\n```",
        "{\"entities\": \"wrong shape\"}",
        "",
    ] {
        assert!(
            WireExtraction::from_model_output(garbage).is_err(),
            "accepted: {garbage:?}"
        );
    }
}

#[test]
fn ledger_rejects_illegal_sequences_exhaustively() {
    use ExtractionState::*;
    let states = [Pending, TierADone, TierBDone, TierCDone, Completed, Failed];

    for from in states {
        for to in states {
            let expected = match (from, to) {
                (_, Failed) => from != Failed,
                (Pending, TierADone)
                | (TierADone, TierBDone)
                | (TierBDone, TierCDone)
                | (TierCDone, Completed) => true,
                _ => false,
            };
            assert_eq!(from.can_advance_to(to), expected, "{from} -> {to}");
        }
    }
}

#[test]
fn failed_document_surfaces_cause_in_listing() {
    let ledger = DocumentLedger::new();
    ledger.register("doc-bad", SourceType::Web, "hash", "job-1");
    ledger
        .transition("doc-bad", ExtractionState::Failed, "blocked by WAF")
        .unwrap();
    ledger.mark_failed("doc-bad", FailureCause::Waf);

    let failed = ledger.list(Some(ExtractionState::Failed), None, 10, 0);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].cause, Some(FailureCause::Waf));

    let causes = ledger.counts_by_cause();
    assert_eq!(causes, vec![(FailureCause::Waf, 1)]);
}

#[test]
fn corrupted_payload_is_rejected_at_the_door() {
    let mut doc = NormalizedDocument {
        doc_id: "doc-corrupt".into(),
        source_type: SourceType::Web,
        source_url: None,
        ingested_at: chrono::Utc::now(),
        content_hash: content_hash("what the reader saw"),
        text: "what actually arrived".into(),
        sub_structures: Vec::new(),
    };
    let err = accept_document(doc.clone(), &IngestConfig::default()).unwrap_err();
    assert!(matches!(err, tessera::ingest::IngestError::HashMismatch { .. }));

    doc.content_hash = content_hash(&doc.text);
    assert!(accept_document(doc, &IngestConfig::default()).is_ok());
}

#[test]
fn resubmission_with_same_hash_is_a_noop() {
    let ledger = DocumentLedger::new();
    assert_eq!(
        ledger.register("doc-1", SourceType::Web, "hash-a", "job-1"),
        RegisterOutcome::Accepted
    );
    ledger.transition("doc-1", ExtractionState::TierADone, "tier_a").unwrap();

    assert_eq!(
        ledger.register("doc-1", SourceType::Web, "hash-a", "job-2"),
        RegisterOutcome::DuplicateNoop
    );
    // State untouched by the duplicate.
    assert_eq!(ledger.get("doc-1").unwrap().state, ExtractionState::TierADone);
}

#[test]
fn cause_codes_parse_from_operator_input() {
    assert_eq!(
        FailureCause::from_str("E_LLM_FORMAT").unwrap(),
        FailureCause::LlmFormat
    );
    assert_eq!(
        FailureCause::from_str("E_GRAPH_WRITE").unwrap(),
        FailureCause::GraphWrite
    );
    assert!(FailureCause::from_str("E_NOPE").is_err());
}
