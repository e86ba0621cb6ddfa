//! Workspace umbrella crate for Tessera.
//!
//! The `tessera` crate re-exports the schema, ingest, extraction, staging,
//! store, and retrieval layers so applications can drive the full pipeline
//! through a single dependency, and owns the process-wide observability
//! hooks the stages report into.
//!
//! ## Observability
//!
//! Stage outcomes can be captured by installing a [`PipelineEventLogger`]
//! via [`set_pipeline_logger`]. The bundled [`KeyValueLogger`] writes one
//! structured `key="value"` line per stage outcome, suitable for piping into
//! any log collector. Components also emit `metrics` counters and
//! histograms; the HTTP shell exposes them in Prometheus format.
//!
//! ```
//! use std::sync::Arc;
//! use tessera::observe::{set_pipeline_logger, KeyValueLogger, PipelineStage, StageTimer};
//!
//! set_pipeline_logger(Some(Arc::new(KeyValueLogger::stdout())));
//! let timer = StageTimer::start(PipelineStage::TierA, "doc-1");
//! // ... run the stage ...
//! timer.finish(Ok(()));
//! set_pipeline_logger(None);
//! ```
//!
//! ## Configuration
//!
//! [`TesseraConfig`] loads the whole pipeline from one YAML file; every
//! stage section is optional and falls back to its defaults.

pub mod config;
pub mod observe;

pub use config::{ConfigLoadError, TesseraConfig};

pub use deterministic;
pub use graphstore;
pub use inference;
pub use ingest;
pub use linguistic;
pub use orchestrator;
pub use retrieval;
pub use schema;
pub use staging;
pub use vectorstore;
