use serde::{Deserialize, Serialize};

/// Configuration for document intake and chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Remove ASCII control characters from ids and URLs.
    pub strip_control_chars: bool,
    /// Reject documents whose text exceeds this many bytes.
    pub max_text_bytes: Option<usize>,
    /// Recompute the SHA-256 of the text and compare against the reader's
    /// `content_hash`.
    pub verify_content_hash: bool,
    /// Token budget per chunk.
    pub chunk_tokens: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            strip_control_chars: true,
            max_text_bytes: Some(10 * 1024 * 1024),
            verify_content_hash: true,
            chunk_tokens: 512,
        }
    }
}

impl IngestConfig {
    pub fn with_chunk_tokens(mut self, tokens: usize) -> Self {
        self.chunk_tokens = tokens;
        self
    }

    pub fn with_max_text_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_text_bytes = limit;
        self
    }

    pub fn with_verify_content_hash(mut self, verify: bool) -> Self {
        self.verify_content_hash = verify;
        self
    }
}
