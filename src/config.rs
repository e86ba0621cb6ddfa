//! YAML configuration for the whole pipeline.
//!
//! One file describes every stage; omitted sections fall back to their
//! defaults. Example:
//!
//! ```yaml
//! version: "1.0"
//! name: homelab
//!
//! ingest:
//!   chunk_tokens: 512
//!   verify_content_hash: true
//!
//! linguistic:
//!   windows:
//!     max_windows: 16
//!     min_score: 3.0
//!
//! inference:
//!   llm:
//!     endpoint_url: "http://gpu-box:11434/api/chat"
//!     model: "qwen2.5:14b-instruct"
//!   tier_c:
//!     batch_size: 16
//!
//! graph:
//!   uri: "bolt://localhost:7687"
//!   user: neo4j
//!   password: secret
//!
//! vector:
//!   collection:
//!     url: "http://localhost:6334"
//!     dimension: 1024
//!   embedder:
//!     endpoint_url: "http://localhost:8081/embed"
//!
//! retrieval:
//!   top_k: 20
//!   rerank_top_n: 5
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading the pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Graph store connection section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSection {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub write: graphstore::GraphWriteConfig,
    pub traversal: graphstore::TraversalConfig,
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".into(),
            user: "neo4j".into(),
            password: "neo4j".into(),
            write: graphstore::GraphWriteConfig::default(),
            traversal: graphstore::TraversalConfig::default(),
        }
    }
}

/// Vector store + embedder section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorSection {
    pub collection: vectorstore::VectorCollectionConfig,
    pub embedder: vectorstore::EmbedConfig,
}

/// Structured-extraction section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSection {
    pub llm: inference::LlmConfig,
    pub tier_c: inference::TierCConfig,
}

/// Query-path section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    #[serde(flatten)]
    pub pipeline: retrieval::RetrievalConfig,
    pub reranker: retrieval::RerankConfig,
    pub synthesizer: retrieval::SynthesizerConfig,
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TesseraConfig {
    /// Configuration format version.
    pub version: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub ingest: ingest::IngestConfig,

    #[serde(default)]
    pub deterministic: deterministic::DeterministicConfig,

    #[serde(default)]
    pub linguistic: linguistic::LinguisticConfig,

    #[serde(default)]
    pub inference: InferenceSection,

    #[serde(default)]
    pub graph: GraphSection,

    #[serde(default)]
    pub vector: VectorSection,

    #[serde(default)]
    pub retrieval: RetrievalSection,

    #[serde(default)]
    pub orchestrator: orchestrator::OrchestratorConfig,
}

impl Default for TesseraConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            ingest: ingest::IngestConfig::default(),
            deterministic: deterministic::DeterministicConfig::default(),
            linguistic: linguistic::LinguisticConfig::default(),
            inference: InferenceSection::default(),
            graph: GraphSection::default(),
            vector: VectorSection::default(),
            retrieval: RetrievalSection::default(),
            orchestrator: orchestrator::OrchestratorConfig::default(),
        }
    }
}

impl TesseraConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: TesseraConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => {}
            v => return Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }
        if self.ingest.chunk_tokens == 0 {
            return Err(ConfigLoadError::Validation(
                "ingest.chunk_tokens must be >= 1".to_string(),
            ));
        }
        if self.vector.collection.dimension != self.vector.embedder.dimension {
            return Err(ConfigLoadError::Validation(format!(
                "vector.collection.dimension ({}) must match vector.embedder.dimension ({})",
                self.vector.collection.dimension, self.vector.embedder.dimension
            )));
        }
        if !(1..=64).contains(&self.inference.tier_c.batch_size) {
            return Err(ConfigLoadError::Validation(format!(
                "inference.tier_c.batch_size {} out of range",
                self.inference.tier_c.batch_size
            )));
        }
        if self.retrieval.pipeline.rerank_top_n > self.retrieval.pipeline.top_k {
            return Err(ConfigLoadError::Validation(
                "retrieval.rerank_top_n must not exceed retrieval.top_k".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(TesseraConfig::default().validate().is_ok());
    }

    #[test]
    fn minimal_yaml_loads() {
        let config = TesseraConfig::from_yaml("version: \"1.0\"\n").unwrap();
        assert_eq!(config.ingest.chunk_tokens, 512);
        assert_eq!(config.retrieval.pipeline.top_k, 20);
    }

    #[test]
    fn unsupported_version_rejected() {
        let err = TesseraConfig::from_yaml("version: \"9.9\"\n").unwrap_err();
        assert!(matches!(err, ConfigLoadError::UnsupportedVersion(_)));
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let yaml = r#"
version: "1.0"
vector:
  collection:
    dimension: 768
  embedder:
    dimension: 1024
"#;
        let err = TesseraConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Validation(_)));
    }

    #[test]
    fn sections_override_defaults() {
        let yaml = r#"
version: "1.0"
name: homelab
inference:
  llm:
    model: "llama3.1:70b"
  tier_c:
    batch_size: 8
orchestrator:
  workers: 8
"#;
        let config = TesseraConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.name.as_deref(), Some("homelab"));
        assert_eq!(config.inference.llm.model, "llama3.1:70b");
        assert_eq!(config.inference.tier_c.batch_size, 8);
        assert_eq!(config.orchestrator.workers, 8);
        // Untouched sections keep defaults.
        assert_eq!(config.orchestrator.doc_timeout_secs, 300);
    }
}
