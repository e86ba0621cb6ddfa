//! Canonical failure cause codes, visible across the whole pipeline: the
//! same set appears in DLQ entries, document failure records, metrics
//! labels, and operator-facing status output.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureCause {
    #[serde(rename = "E_URL_BAD")]
    UrlBad,
    #[serde(rename = "E_ROBOTS")]
    Robots,
    #[serde(rename = "E_403_WAF")]
    Waf,
    #[serde(rename = "E_429_RATE")]
    RateLimited,
    #[serde(rename = "E_5XX_ORIGIN")]
    OriginError,
    #[serde(rename = "E_PARSE")]
    Parse,
    #[serde(rename = "E_TIMEOUT")]
    Timeout,
    #[serde(rename = "E_BROWSER")]
    Browser,
    #[serde(rename = "E_LLM_FORMAT")]
    LlmFormat,
    #[serde(rename = "E_GPU_OOM")]
    GpuOom,
    #[serde(rename = "E_GRAPH_WRITE")]
    GraphWrite,
    #[serde(rename = "E_VECTOR_WRITE")]
    VectorWrite,
    #[serde(rename = "E_INTERNAL")]
    Internal,
}

impl FailureCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCause::UrlBad => "E_URL_BAD",
            FailureCause::Robots => "E_ROBOTS",
            FailureCause::Waf => "E_403_WAF",
            FailureCause::RateLimited => "E_429_RATE",
            FailureCause::OriginError => "E_5XX_ORIGIN",
            FailureCause::Parse => "E_PARSE",
            FailureCause::Timeout => "E_TIMEOUT",
            FailureCause::Browser => "E_BROWSER",
            FailureCause::LlmFormat => "E_LLM_FORMAT",
            FailureCause::GpuOom => "E_GPU_OOM",
            FailureCause::GraphWrite => "E_GRAPH_WRITE",
            FailureCause::VectorWrite => "E_VECTOR_WRITE",
            FailureCause::Internal => "E_INTERNAL",
        }
    }

    /// Whether a failure of this kind is worth retrying. `attempt` is the
    /// number of attempts already made: a malformed extractor response is
    /// transient exactly once, then permanent.
    pub fn is_transient(&self, attempt: u32) -> bool {
        match self {
            FailureCause::Timeout
            | FailureCause::RateLimited
            | FailureCause::OriginError
            | FailureCause::GpuOom
            | FailureCause::GraphWrite
            | FailureCause::VectorWrite => true,
            FailureCause::LlmFormat => attempt == 0,
            FailureCause::UrlBad
            | FailureCause::Robots
            | FailureCause::Waf
            | FailureCause::Parse
            | FailureCause::Browser
            | FailureCause::Internal => false,
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureCause {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "E_URL_BAD" => Ok(FailureCause::UrlBad),
            "E_ROBOTS" => Ok(FailureCause::Robots),
            "E_403_WAF" => Ok(FailureCause::Waf),
            "E_429_RATE" => Ok(FailureCause::RateLimited),
            "E_5XX_ORIGIN" => Ok(FailureCause::OriginError),
            "E_PARSE" => Ok(FailureCause::Parse),
            "E_TIMEOUT" => Ok(FailureCause::Timeout),
            "E_BROWSER" => Ok(FailureCause::Browser),
            "E_LLM_FORMAT" => Ok(FailureCause::LlmFormat),
            "E_GPU_OOM" => Ok(FailureCause::GpuOom),
            "E_GRAPH_WRITE" => Ok(FailureCause::GraphWrite),
            "E_VECTOR_WRITE" => Ok(FailureCause::VectorWrite),
            "E_INTERNAL" => Ok(FailureCause::Internal),
            other => Err(format!("unknown failure cause: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_all_causes() {
        let all = [
            FailureCause::UrlBad,
            FailureCause::Robots,
            FailureCause::Waf,
            FailureCause::RateLimited,
            FailureCause::OriginError,
            FailureCause::Parse,
            FailureCause::Timeout,
            FailureCause::Browser,
            FailureCause::LlmFormat,
            FailureCause::GpuOom,
            FailureCause::GraphWrite,
            FailureCause::VectorWrite,
            FailureCause::Internal,
        ];
        for cause in all {
            assert_eq!(cause.as_str().parse::<FailureCause>().unwrap(), cause);
        }
    }

    #[test]
    fn llm_format_transient_only_once() {
        assert!(FailureCause::LlmFormat.is_transient(0));
        assert!(!FailureCause::LlmFormat.is_transient(1));
    }

    #[test]
    fn waf_is_permanent() {
        assert!(!FailureCause::Waf.is_transient(0));
        assert!(FailureCause::Timeout.is_transient(2));
    }
}
