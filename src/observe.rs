//! Process-wide stage observability hooks.
//!
//! A single logger slot holds an optional [`PipelineEventLogger`]; stages
//! report their outcome through a [`StageTimer`] and the installed logger
//! receives one [`PipelineEvent`] per stage. When no logger is installed the
//! hooks cost one atomic load.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};

/// Pipeline stages as they appear in logs and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Ingest,
    Chunk,
    TierA,
    TierB,
    TierC,
    Resolve,
    GraphWrite,
    VectorWrite,
    Embed,
    VectorSearch,
    Rerank,
    Traverse,
    Synthesize,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Ingest => "ingest",
            PipelineStage::Chunk => "chunk",
            PipelineStage::TierA => "tier_a",
            PipelineStage::TierB => "tier_b",
            PipelineStage::TierC => "tier_c",
            PipelineStage::Resolve => "resolve",
            PipelineStage::GraphWrite => "graph_write",
            PipelineStage::VectorWrite => "vector_write",
            PipelineStage::Embed => "embed",
            PipelineStage::VectorSearch => "vector_search",
            PipelineStage::Rerank => "rerank",
            PipelineStage::Traverse => "traverse",
            PipelineStage::Synthesize => "synthesize",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stage outcome.
#[derive(Debug, Clone)]
pub struct PipelineEvent {
    pub stage: PipelineStage,
    pub subject: String,
    pub latency: Duration,
    pub error: Option<String>,
}

impl PipelineEvent {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    fn format_key_values(&self, include_timestamp: bool) -> String {
        let mut parts = Vec::new();
        if include_timestamp {
            let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
            parts.push(format!("timestamp=\"{ts}\""));
        }
        parts.push(format!("stage={}", self.stage));
        let status = if self.succeeded() { "success" } else { "failure" };
        parts.push(format!("status={status}"));
        parts.push(format!("latency_us={}", self.latency.as_micros()));
        parts.push(format!("subject=\"{}\"", escape_kv(&self.subject)));
        if let Some(error) = &self.error {
            parts.push(format!("error=\"{}\"", escape_kv(error)));
        }
        parts.join(" ")
    }
}

fn escape_kv(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// Hook for receiving structured stage events.
pub trait PipelineEventLogger: Send + Sync {
    fn log(&self, event: &PipelineEvent);
}

/// Key-value logger over any writer.
pub struct KeyValueLogger {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    include_timestamp: bool,
}

impl KeyValueLogger {
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
            include_timestamp: true,
        }
    }

    pub fn with_timestamps(mut self, include_timestamp: bool) -> Self {
        self.include_timestamp = include_timestamp;
        self
    }
}

impl PipelineEventLogger for KeyValueLogger {
    fn log(&self, event: &PipelineEvent) {
        if let Ok(mut writer) = self.writer.lock() {
            let line = event.format_key_values(self.include_timestamp);
            let _ = writeln!(writer, "{line}");
        }
    }
}

fn logger_slot() -> &'static RwLock<Option<Arc<dyn PipelineEventLogger>>> {
    static LOGGER: OnceLock<RwLock<Option<Arc<dyn PipelineEventLogger>>>> = OnceLock::new();
    LOGGER.get_or_init(|| RwLock::new(None))
}

/// Install or clear the structured pipeline event logger.
pub fn set_pipeline_logger(logger: Option<Arc<dyn PipelineEventLogger>>) {
    let mut guard = logger_slot()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = logger;
}

fn pipeline_logger() -> Option<Arc<dyn PipelineEventLogger>> {
    logger_slot()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

/// Times one stage and reports its outcome to the installed logger.
pub struct StageTimer {
    stage: PipelineStage,
    subject: String,
    start: Instant,
}

impl StageTimer {
    pub fn start(stage: PipelineStage, subject: impl Into<String>) -> Self {
        Self {
            stage,
            subject: subject.into(),
            start: Instant::now(),
        }
    }

    pub fn finish(self, result: Result<(), ()>) {
        self.finish_with(result.err().map(|_| "stage failed".to_string()))
    }

    pub fn finish_with(self, error: Option<String>) {
        if let Some(logger) = pipeline_logger() {
            logger.log(&PipelineEvent {
                stage: self.stage,
                subject: self.subject,
                latency: self.start.elapsed(),
                error,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingLogger {
        events: AtomicUsize,
        failures: AtomicUsize,
    }

    impl PipelineEventLogger for CountingLogger {
        fn log(&self, event: &PipelineEvent) {
            self.events.fetch_add(1, Ordering::SeqCst);
            if !event.succeeded() {
                self.failures.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn installed_logger_receives_events() {
        let logger = Arc::new(CountingLogger::default());
        set_pipeline_logger(Some(logger.clone()));

        StageTimer::start(PipelineStage::TierA, "doc-1").finish(Ok(()));
        StageTimer::start(PipelineStage::TierC, "doc-1")
            .finish_with(Some("timeout".to_string()));

        set_pipeline_logger(None);
        assert_eq!(logger.events.load(Ordering::SeqCst), 2);
        assert_eq!(logger.failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_logger_is_a_noop() {
        set_pipeline_logger(None);
        StageTimer::start(PipelineStage::Embed, "q").finish(Ok(()));
    }

    #[test]
    fn key_value_line_escapes_quotes() {
        let event = PipelineEvent {
            stage: PipelineStage::Synthesize,
            subject: "what \"runs\" where".into(),
            latency: Duration::from_micros(1500),
            error: None,
        };
        let line = event.format_key_values(false);
        assert!(line.contains("stage=synthesize"));
        assert!(line.contains("status=success"));
        assert!(line.contains("latency_us=1500"));
        assert!(line.contains("subject=\"what \\\"runs\\\" where\""));
    }
}
