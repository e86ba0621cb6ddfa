//! Tessera Ingest Layer
//!
//! This is where documents enter the pipeline. Readers hand over a
//! [`NormalizedDocument`]; we validate identifiers and metadata, verify the
//! content hash, enforce size limits, and cut the text into fixed-budget
//! [`Chunk`]s for the embedding path.
//!
//! ## What we do here
//!
//! - **Validate and normalize metadata** - non-empty `doc_id`, control
//!   characters stripped, URL sanity.
//! - **Verify integrity** - recompute the SHA-256 content hash and compare it
//!   against what the reader claims.
//! - **Chunk** - 512-token slices with contiguous ordinals and deterministic
//!   UUIDv5 chunk ids, so re-ingest overwrites in place.
//! - **Log everything** - structured events via tracing with `doc_id` and
//!   timing fields.
//!
//! Errors are typed ([`IngestError`]) so callers can distinguish a corrupt
//! payload from an oversized one.

use std::time::Instant;

use tracing::{info, warn};

mod chunker;
mod config;
mod error;
pub mod hash;
mod types;

pub use chunker::{chunk_document, Chunk};
pub use config::IngestConfig;
pub use error::IngestError;
pub use types::{ExtractionState, NormalizedDocument, SourceType, SubStructure};

/// Accept a reader-produced document: validate ids, enforce limits, verify
/// the content hash. Returns the (possibly sanitized) document.
pub fn accept_document(
    mut doc: NormalizedDocument,
    cfg: &IngestConfig,
) -> Result<NormalizedDocument, IngestError> {
    let start = Instant::now();

    if cfg.strip_control_chars {
        doc.doc_id = strip_control(&doc.doc_id);
        if let Some(url) = doc.source_url.take() {
            doc.source_url = Some(strip_control(&url));
        }
    }
    if doc.doc_id.trim().is_empty() {
        warn!(error = "empty doc_id", "ingest_failure");
        return Err(IngestError::EmptyDocId);
    }
    if doc.text.trim().is_empty() && doc.sub_structures.is_empty() {
        warn!(doc_id = %doc.doc_id, error = "empty text", "ingest_failure");
        return Err(IngestError::EmptyText);
    }
    if let Some(limit) = cfg.max_text_bytes {
        if doc.text.len() > limit {
            warn!(doc_id = %doc.doc_id, size = doc.text.len(), limit, "ingest_failure");
            return Err(IngestError::TextTooLarge {
                size: doc.text.len(),
                limit,
            });
        }
    }
    if cfg.verify_content_hash {
        let computed = hash::content_hash(&doc.text);
        if computed != doc.content_hash {
            warn!(doc_id = %doc.doc_id, "ingest_failure: content hash mismatch");
            return Err(IngestError::HashMismatch {
                doc_id: doc.doc_id.clone(),
                claimed: doc.content_hash.clone(),
                computed,
            });
        }
    }

    info!(
        doc_id = %doc.doc_id,
        source_type = %doc.source_type,
        text_len = doc.text.len(),
        sub_structures = doc.sub_structures.len(),
        elapsed_micros = start.elapsed().as_micros() as u64,
        "ingest_success"
    );
    Ok(doc)
}

fn strip_control(s: &str) -> String {
    s.chars().filter(|c| !c.is_control()).collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn base_doc(text: &str) -> NormalizedDocument {
        NormalizedDocument {
            doc_id: "doc-1".into(),
            source_type: SourceType::Web,
            source_url: Some("https://example.com/page".into()),
            ingested_at: Utc::now(),
            content_hash: hash::content_hash(text),
            text: text.into(),
            sub_structures: Vec::new(),
        }
    }

    #[test]
    fn accept_valid_document() {
        let doc = base_doc("The nginx service depends on postgres.");
        let accepted = accept_document(doc.clone(), &IngestConfig::default()).unwrap();
        assert_eq!(accepted.doc_id, doc.doc_id);
    }

    #[test]
    fn reject_empty_doc_id() {
        let mut doc = base_doc("text");
        doc.doc_id = "  ".into();
        let err = accept_document(doc, &IngestConfig::default()).unwrap_err();
        assert!(matches!(err, IngestError::EmptyDocId));
    }

    #[test]
    fn reject_hash_mismatch() {
        let mut doc = base_doc("original text");
        doc.content_hash = "deadbeef".into();
        let err = accept_document(doc, &IngestConfig::default()).unwrap_err();
        assert!(matches!(err, IngestError::HashMismatch { .. }));
    }

    #[test]
    fn hash_check_can_be_disabled() {
        let mut doc = base_doc("original text");
        doc.content_hash = "deadbeef".into();
        let cfg = IngestConfig::default().with_verify_content_hash(false);
        assert!(accept_document(doc, &cfg).is_ok());
    }

    #[test]
    fn control_chars_removed_from_ids() {
        let mut doc = base_doc("text");
        doc.doc_id = "doc\u{0007}-ctrl\n".into();
        let accepted = accept_document(doc, &IngestConfig::default()).unwrap();
        assert_eq!(accepted.doc_id, "doc-ctrl");
    }

    #[test]
    fn oversized_text_rejected() {
        let doc = base_doc(&"x".repeat(64));
        let cfg = IngestConfig::default().with_max_text_bytes(Some(32));
        let err = accept_document(doc, &cfg).unwrap_err();
        assert!(matches!(err, IngestError::TextTooLarge { .. }));
    }

    #[test]
    fn code_only_document_is_accepted() {
        let mut doc = base_doc("");
        doc.sub_structures.push(SubStructure {
            language: Some("yaml".into()),
            text: "services: {}".into(),
            span: (0, 12),
        });
        doc.content_hash = hash::content_hash("");
        assert!(accept_document(doc, &IngestConfig::default()).is_ok());
    }
}
