//! Tessera command-line interface.
//!
//! Thin dispatch over the pipeline crates: `init` provisions stores,
//! `ingest` enqueues documents, `extract` drives the orchestrator, `query`
//! runs one hybrid retrieval, `serve` starts the HTTP shell. Every command
//! supports `--json` for machine-readable output and exits 0 on success,
//! 1 on user error, 2 on internal failure.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use graphstore::{GraphTraverser, GraphWriter};
use ingest::{hash::content_hash, NormalizedDocument, SourceType};
use inference::{LlmClient, TierCExtractor};
use orchestrator::{DocumentLedger, Orchestrator};
use retrieval::{HybridRetriever, RerankClient, Synthesizer};
use staging::{DeadLetterQueue, ExtractionCache};
use tessera::TesseraConfig;
use vectorstore::{EmbedClient, QueryFilters, VectorCollection};

#[derive(Parser)]
#[command(name = "tessera", version, about = "Document-to-graph RAG pipeline")]
struct Cli {
    /// Pipeline configuration file.
    #[arg(long, global = true, default_value = "tessera.yaml")]
    config: PathBuf,

    /// Emit machine-readable JSON instead of human output.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create graph constraints and the vector collection.
    Init,
    /// Enqueue documents from a file or directory.
    Ingest {
        /// Source family tag for the ingested documents.
        source_type: String,
        /// File or directory to read.
        target: PathBuf,
        /// Stop after this many documents.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Orchestrator operations.
    #[command(subcommand)]
    Extract(ExtractCommand),
    /// Run one hybrid query.
    Query {
        question: String,
        /// Comma-separated source types to restrict to.
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,
        /// Only chunks ingested on or after this date (YYYY-MM-DD).
        #[arg(long)]
        after: Option<String>,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        rerank_top_n: Option<usize>,
    },
    /// Health of collaborators and queue depths.
    Status,
    /// Listings.
    #[command(subcommand)]
    List(ListCommand),
    /// Start the HTTP shell.
    Serve,
}

#[derive(Subcommand)]
enum ExtractCommand {
    /// Drive every queued or intermediate document to completion.
    Pending,
    /// Reset documents updated inside the window and re-drive them.
    Reprocess {
        #[arg(long)]
        since: String,
    },
    /// Print live extraction counters.
    Status,
}

#[derive(Subcommand)]
enum ListCommand {
    Documents {
        #[arg(long)]
        source_type: Option<String>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
}

/// Shared handles built once per invocation.
struct Pipeline {
    ledger: Arc<DocumentLedger>,
    dlq: Arc<DeadLetterQueue>,
    orchestrator: Arc<Orchestrator>,
    retriever: Arc<HybridRetriever>,
    synthesizer: Arc<Synthesizer>,
    collection: Arc<VectorCollection>,
    writer: Arc<GraphWriter>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::User(message)) => {
            eprintln!("error: {message}");
            ExitCode::from(1)
        }
        Err(CliError::Internal(message)) => {
            eprintln!("internal error: {message}");
            ExitCode::from(2)
        }
    }
}

enum CliError {
    User(String),
    Internal(String),
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Internal(err.to_string())
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = load_config(&cli.config)?;

    match cli.command {
        Command::Init => {
            let pipeline = build_pipeline(&config).await?;
            let constraints = graphstore::init::apply_constraints(&pipeline.writer.graph())
                .await
                .map_err(|e| CliError::Internal(e.to_string()))?;
            let created = pipeline
                .collection
                .ensure_collection()
                .await
                .map_err(|e| CliError::Internal(e.to_string()))?;
            // Any collaborator failing its probe is an exit-1 condition for
            // init, not an internal fault.
            health_checks(&pipeline).await.map_err(|e| match e {
                CliError::Internal(message) => CliError::User(message),
                other => other,
            })?;
            emit(
                cli.json,
                json!({"constraints": constraints, "collection_created": created}),
                &format!("applied {constraints} constraints, collection created: {created}"),
            );
            Ok(())
        }

        Command::Ingest {
            source_type,
            target,
            limit,
        } => {
            let source_type = SourceType::from_str(&source_type).map_err(CliError::User)?;
            let documents = read_documents(&target, source_type, limit)?;
            if documents.is_empty() {
                return Err(CliError::User(format!(
                    "no readable documents under {}",
                    target.display()
                )));
            }
            let pipeline = build_pipeline(&config).await?;
            let mut job_ids = Vec::with_capacity(documents.len());
            for doc in documents {
                let job_id = match pipeline.orchestrator.submit(doc.clone()).await {
                    Ok(job_id) => job_id,
                    Err(tessera::orchestrator::OrchestratorError::Saturated(_)) => {
                        // Drain what is queued, then retry the shed document.
                        pipeline.orchestrator.run_until_drained().await;
                        pipeline
                            .orchestrator
                            .submit(doc)
                            .await
                            .map_err(|e| CliError::Internal(e.to_string()))?
                    }
                    Err(e) => return Err(CliError::Internal(e.to_string())),
                };
                job_ids.push(job_id);
            }
            // The work queue lives in this process, so drive it before
            // exiting; the job ids still identify each document's run.
            pipeline.orchestrator.run_until_drained().await;
            emit(
                cli.json,
                json!({"jobs": job_ids}),
                &format!("enqueued {} documents", job_ids.len()),
            );
            Ok(())
        }

        Command::Extract(command) => {
            let pipeline = build_pipeline(&config).await?;
            match command {
                ExtractCommand::Pending => {
                    pipeline.orchestrator.run_until_drained().await;
                    let reclaimed = pipeline.orchestrator.reclaim_stale();
                    emit(
                        cli.json,
                        json!({"drained": true, "reclaimed": reclaimed.len()}),
                        "extraction queue drained",
                    );
                }
                ExtractCommand::Reprocess { since } => {
                    let window = server::parse_duration(&since)
                        .ok_or_else(|| CliError::User(format!("unparseable duration: {since}")))?;
                    let cutoff = Utc::now()
                        - chrono::Duration::from_std(window)
                            .map_err(|e| CliError::User(e.to_string()))?;
                    let doc_ids = pipeline.orchestrator.reprocess_since(cutoff);
                    emit(
                        cli.json,
                        json!({"reset": doc_ids.len(), "doc_ids": doc_ids}),
                        &format!("reset {} documents to pending", doc_ids.len()),
                    );
                }
                ExtractCommand::Status => {
                    print_status(cli.json, &pipeline);
                }
            }
            Ok(())
        }

        Command::Query {
            question,
            sources,
            after,
            top_k,
            rerank_top_n,
        } => {
            if let Some(top_k) = top_k {
                config.retrieval.pipeline.top_k = top_k;
            }
            if let Some(rerank_top_n) = rerank_top_n {
                config.retrieval.pipeline.rerank_top_n = rerank_top_n;
            }
            let pipeline = build_pipeline(&config).await?;
            let filters = build_filters(&sources, after.as_deref())?;

            let bundle = pipeline
                .retriever
                .retrieve(&question, &filters)
                .await
                .map_err(|e| CliError::Internal(e.to_string()))?;
            let answer = pipeline
                .synthesizer
                .answer(&question, &bundle)
                .await
                .map_err(|e| CliError::Internal(e.to_string()))?;

            if cli.json {
                emit(
                    true,
                    json!({
                        "answer": answer.answer,
                        "sources": answer.sources,
                        "latency": answer.latency_breakdown,
                    }),
                    "",
                );
            } else {
                println!("{}\n", answer.answer);
                for (index, source) in &answer.sources {
                    println!("  [{index}] {source}");
                }
                let lat = answer.latency_breakdown;
                println!(
                    "\nlatency: embed {}ms, vector {}ms, rerank {}ms, graph {}ms, synthesis {}ms",
                    lat.embed_ms, lat.vector_ms, lat.rerank_ms, lat.graph_ms, lat.synthesis_ms
                );
            }
            Ok(())
        }

        Command::Status => {
            let pipeline = build_pipeline(&config).await?;
            health_checks(&pipeline).await?;
            print_status(cli.json, &pipeline);
            Ok(())
        }

        Command::List(ListCommand::Documents {
            source_type,
            state,
            limit,
            offset,
        }) => {
            let state_filter = state
                .as_deref()
                .map(ingest::ExtractionState::from_str)
                .transpose()
                .map_err(CliError::User)?;
            let source_filter = source_type
                .as_deref()
                .map(SourceType::from_str)
                .transpose()
                .map_err(CliError::User)?;

            let pipeline = build_pipeline(&config).await?;
            let rows = pipeline.ledger.list(state_filter, source_filter, limit, offset);
            if cli.json {
                let documents: Vec<_> = rows
                    .iter()
                    .map(|d| {
                        json!({
                            "doc_id": d.doc_id,
                            "source_type": d.source_type.as_str(),
                            "state": d.state.as_str(),
                            "cause": d.cause.map(|c| c.as_str()),
                            "updated_at": d.updated_at.to_rfc3339(),
                        })
                    })
                    .collect();
                emit(true, json!({"documents": documents}), "");
            } else {
                println!("{:<40} {:<16} {:<12} {}", "doc_id", "source", "state", "cause");
                for d in rows {
                    println!(
                        "{:<40} {:<16} {:<12} {}",
                        d.doc_id,
                        d.source_type.as_str(),
                        d.state.as_str(),
                        d.cause.map(|c| c.as_str()).unwrap_or("-")
                    );
                }
            }
            Ok(())
        }

        Command::Serve => {
            let pipeline = build_pipeline(&config).await?;
            let server_config =
                server::ServerConfig::load().map_err(|e| CliError::Internal(e.to_string()))?;

            // Background upkeep: heartbeat reclamation, dead-letter redrive,
            // quarantine retention.
            let maintenance = pipeline.orchestrator.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(std::time::Duration::from_secs(30));
                loop {
                    ticker.tick().await;
                    maintenance.maintain();
                }
            });
            let prometheus = metrics_exporter_prometheus_handle()?;
            let state = Arc::new(server::ServerState {
                config: Arc::new(server_config),
                rate_limiter: Arc::new(dashmap_new()),
                idempotency: Arc::new(dashmap_new()),
                orchestrator: pipeline.orchestrator.clone(),
                retriever: pipeline.retriever.clone(),
                synthesizer: pipeline.synthesizer.clone(),
                dlq: pipeline.dlq.clone(),
                graph: pipeline.writer.clone(),
                prometheus,
            });
            server::start_server(state)
                .await
                .map_err(|e| CliError::Internal(e.to_string()))?;
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<TesseraConfig, CliError> {
    if path.exists() {
        TesseraConfig::from_file(path).map_err(|e| CliError::User(e.to_string()))
    } else {
        Ok(TesseraConfig::default())
    }
}

/// Wire every layer together from the loaded configuration.
async fn build_pipeline(config: &TesseraConfig) -> Result<Pipeline, CliError> {
    let ledger = Arc::new(DocumentLedger::new());
    let dlq = Arc::new(DeadLetterQueue::default());
    let cache = Arc::new(ExtractionCache::default());

    let writer = Arc::new(
        GraphWriter::connect(
            &config.graph.uri,
            &config.graph.user,
            &config.graph.password,
            dlq.clone(),
            config.graph.write.clone(),
        )
        .await
        .map_err(|e| CliError::Internal(format!("graph store: {e}")))?,
    );
    let traverser = Arc::new(GraphTraverser::new(writer.graph(), config.graph.traversal));

    let collection = Arc::new(
        VectorCollection::connect(config.vector.collection.clone())
            .map_err(|e| CliError::Internal(format!("vector store: {e}")))?,
    );
    let embedder = Arc::new(
        EmbedClient::new(config.vector.embedder.clone())
            .map_err(|e| CliError::User(format!("embedder config: {e}")))?,
    );

    let llm = LlmClient::new(config.inference.llm.clone())
        .map_err(|e| CliError::User(format!("llm config: {e}")))?;
    let tier_c = Arc::new(TierCExtractor::new(
        llm.clone(),
        cache,
        dlq.clone(),
        config.inference.tier_c.clone(),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        ledger.clone(),
        dlq.clone(),
        tier_c,
        writer.clone(),
        embedder.clone(),
        collection.clone(),
        config.ingest.clone(),
        config.deterministic.clone(),
        config.linguistic.clone(),
        config.orchestrator.clone(),
    ));

    let reranker = Arc::new(
        RerankClient::new(config.retrieval.reranker.clone())
            .map_err(|e| CliError::User(format!("reranker config: {e}")))?,
    );
    let retriever = Arc::new(
        HybridRetriever::new(
            embedder,
            collection.clone(),
            reranker,
            traverser,
            config.retrieval.pipeline.clone(),
        )
        .map_err(|e| CliError::User(format!("retrieval config: {e}")))?,
    );
    let synthesizer = Arc::new(Synthesizer::new(llm, config.retrieval.synthesizer.clone()));

    Ok(Pipeline {
        ledger,
        dlq,
        orchestrator,
        retriever,
        synthesizer,
        collection,
        writer,
    })
}

/// Startup dependency probes; any failure aborts the command.
async fn health_checks(pipeline: &Pipeline) -> Result<(), CliError> {
    graphstore::init::health_check(&pipeline.writer.graph())
        .await
        .map_err(|e| CliError::Internal(format!("graph store unhealthy: {e}")))?;
    pipeline
        .collection
        .health_check()
        .await
        .map_err(|e| CliError::Internal(format!("vector store unhealthy: {e}")))?;
    Ok(())
}

fn build_filters(sources: &[String], after: Option<&str>) -> Result<QueryFilters, CliError> {
    let mut filters = QueryFilters::default();
    for source in sources {
        filters
            .source_types
            .push(SourceType::from_str(source).map_err(CliError::User)?);
    }
    if let Some(after) = after {
        let date = chrono::NaiveDate::parse_from_str(after, "%Y-%m-%d")
            .map_err(|e| CliError::User(format!("bad --after date: {e}")))?;
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| CliError::User("bad --after date".into()))?;
        filters.ingested_after = Some(chrono::DateTime::from_naive_utc_and_offset(
            midnight,
            chrono::Utc,
        ));
    }
    Ok(filters)
}

/// Build `NormalizedDocument`s from local files: one per file, doc id
/// derived from the path.
fn read_documents(
    target: &Path,
    source_type: SourceType,
    limit: Option<usize>,
) -> Result<Vec<NormalizedDocument>, CliError> {
    let mut paths = Vec::new();
    if target.is_file() {
        paths.push(target.to_path_buf());
    } else if target.is_dir() {
        let entries = std::fs::read_dir(target)
            .map_err(|e| CliError::User(format!("cannot read {}: {e}", target.display())))?;
        for entry in entries.flatten() {
            if entry.path().is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();
    } else {
        return Err(CliError::User(format!(
            "no such file or directory: {}",
            target.display()
        )));
    }
    if let Some(limit) = limit {
        paths.truncate(limit);
    }

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable file");
                continue;
            }
        };
        documents.push(NormalizedDocument {
            doc_id: format!("file:{}", path.display()),
            source_type,
            source_url: None,
            ingested_at: Utc::now(),
            content_hash: content_hash(&text),
            text,
            sub_structures: Vec::new(),
        });
    }
    Ok(documents)
}

fn print_status(as_json: bool, pipeline: &Pipeline) {
    let by_state = pipeline.ledger.counts_by_state();
    let by_cause = pipeline.ledger.counts_by_cause();
    let depths = pipeline.dlq.depths();

    if as_json {
        let states: Vec<_> = by_state
            .iter()
            .map(|(s, n)| json!({"state": s.as_str(), "count": n}))
            .collect();
        let causes: Vec<_> = by_cause
            .iter()
            .map(|(c, n)| json!({"cause": c.as_str(), "count": n}))
            .collect();
        emit(
            true,
            json!({
                "by_state": states,
                "by_cause": causes,
                "dlq": {"pending": depths.pending, "failed": depths.failed},
            }),
            "",
        );
    } else {
        println!("{:<14} {}", "state", "count");
        for (state, count) in by_state {
            println!("{:<14} {count}", state.as_str());
        }
        if !by_cause.is_empty() {
            println!("\n{:<16} {}", "cause", "count");
            for (cause, count) in by_cause {
                println!("{:<16} {count}", cause.as_str());
            }
        }
        println!("\ndlq: {} pending, {} failed", depths.pending, depths.failed);
    }
}

fn emit(as_json: bool, payload: serde_json::Value, human: &str) {
    if as_json {
        println!("{payload}");
    } else if !human.is_empty() {
        println!("{human}");
    }
}

fn metrics_exporter_prometheus_handle(
) -> Result<metrics_exporter_prometheus::PrometheusHandle, CliError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| CliError::Internal(format!("metrics recorder: {e}")))
}

fn dashmap_new<K: std::hash::Hash + Eq, V>() -> dashmap::DashMap<K, V> {
    dashmap::DashMap::new()
}
