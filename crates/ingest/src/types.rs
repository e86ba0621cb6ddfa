//! Core data model for documents entering the pipeline.
//!
//! Readers (crawlers, API pollers, file parsers) produce
//! [`NormalizedDocument`]s; the extraction pipeline consumes them. The core
//! never fetches content itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Source families a reader may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum SourceType {
    Web,
    Github,
    Reddit,
    Youtube,
    Gmail,
    Elasticsearch,
    DockerCompose,
    Swag,
    Tailscale,
    Unifi,
    AiSession,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Web => "web",
            SourceType::Github => "github",
            SourceType::Reddit => "reddit",
            SourceType::Youtube => "youtube",
            SourceType::Gmail => "gmail",
            SourceType::Elasticsearch => "elasticsearch",
            SourceType::DockerCompose => "docker_compose",
            SourceType::Swag => "swag",
            SourceType::Tailscale => "tailscale",
            SourceType::Unifi => "unifi",
            SourceType::AiSession => "ai_session",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(SourceType::Web),
            "github" => Ok(SourceType::Github),
            "reddit" => Ok(SourceType::Reddit),
            "youtube" => Ok(SourceType::Youtube),
            "gmail" => Ok(SourceType::Gmail),
            "elasticsearch" => Ok(SourceType::Elasticsearch),
            "docker_compose" => Ok(SourceType::DockerCompose),
            "swag" => Ok(SourceType::Swag),
            "tailscale" => Ok(SourceType::Tailscale),
            "unifi" => Ok(SourceType::Unifi),
            "ai_session" => Ok(SourceType::AiSession),
            other => Err(format!("unknown source type: {other}")),
        }
    }
}

/// A sub-format span the reader preserved alongside plain text, typically a
/// fenced code block with its language hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubStructure {
    /// Language hint (`yaml`, `json`, `nginx`, ...) when the reader had one.
    pub language: Option<String>,
    /// Raw block content, fences stripped.
    pub text: String,
    /// Byte span of the block inside the parent text.
    pub span: (usize, usize),
}

/// The unit of ingested source content handed over by readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDocument {
    /// Reader-assigned stable identifier (URL-derived or source-id-derived).
    pub doc_id: String,
    pub source_type: SourceType,
    pub source_url: Option<String>,
    pub ingested_at: DateTime<Utc>,
    /// SHA-256 of `text`, hex-encoded. Resubmitting the same hash under the
    /// same `doc_id` is a no-op upstream.
    pub content_hash: String,
    pub text: String,
    #[serde(default)]
    pub sub_structures: Vec<SubStructure>,
}

/// Lifecycle state of a document inside the extraction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionState {
    Pending,
    TierADone,
    TierBDone,
    TierCDone,
    Completed,
    Failed,
}

impl ExtractionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionState::Pending => "pending",
            ExtractionState::TierADone => "tier_a_done",
            ExtractionState::TierBDone => "tier_b_done",
            ExtractionState::TierCDone => "tier_c_done",
            ExtractionState::Completed => "completed",
            ExtractionState::Failed => "failed",
        }
    }

    /// Whether `self -> to` is a legal forward transition. Any state may move
    /// to `Failed`; the only way back to `Pending` is an explicit reprocess,
    /// which is not expressed through this check.
    pub fn can_advance_to(&self, to: ExtractionState) -> bool {
        use ExtractionState::*;
        if to == Failed {
            return *self != Failed;
        }
        matches!(
            (*self, to),
            (Pending, TierADone)
                | (TierADone, TierBDone)
                | (TierBDone, TierCDone)
                | (TierCDone, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExtractionState::Completed | ExtractionState::Failed)
    }
}

impl fmt::Display for ExtractionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExtractionState::Pending),
            "tier_a_done" => Ok(ExtractionState::TierADone),
            "tier_b_done" => Ok(ExtractionState::TierBDone),
            "tier_c_done" => Ok(ExtractionState::TierCDone),
            "completed" => Ok(ExtractionState::Completed),
            "failed" => Ok(ExtractionState::Failed),
            other => Err(format!("unknown extraction state: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_type_roundtrip() {
        for s in ["web", "docker_compose", "ai_session", "unifi"] {
            let parsed: SourceType = s.parse().unwrap();
            assert_eq!(parsed.as_str(), s);
        }
        assert!("carrier_pigeon".parse::<SourceType>().is_err());
    }

    #[test]
    fn forward_transitions_only() {
        use ExtractionState::*;
        assert!(Pending.can_advance_to(TierADone));
        assert!(TierADone.can_advance_to(TierBDone));
        assert!(TierBDone.can_advance_to(TierCDone));
        assert!(TierCDone.can_advance_to(Completed));

        assert!(!TierBDone.can_advance_to(TierADone));
        assert!(!Completed.can_advance_to(Pending));
        assert!(!Pending.can_advance_to(Completed));
    }

    #[test]
    fn any_live_state_may_fail() {
        use ExtractionState::*;
        for s in [Pending, TierADone, TierBDone, TierCDone, Completed] {
            assert!(s.can_advance_to(Failed));
        }
        assert!(!Failed.can_advance_to(Failed));
    }
}
