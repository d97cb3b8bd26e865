//! # LeapLogic RAG CLI (`rag`)
//!
//! The `rag` binary is the primary interface for the service. It provides
//! commands for database initialization, knowledge base ingestion,
//! answering questions, self-diagnostics, and starting the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the SQLite database and run schema migrations |
//! | `rag ingest` | Rebuild the knowledge base from `knowledge.root` |
//! | `rag stats` | Show document and chunk counts |
//! | `rag ask "<question>"` | Answer a question from the knowledge base |
//! | `rag model` | Print the chat model name |
//! | `rag diagnose` | Check the embedding pipeline end to end |
//! | `rag serve` | Start the HTTP API (and the optional hello server) |
//!
//! ## Examples
//!
//! ```bash
//! rag init
//! rag ingest
//! rag ask "How do S3 buckets work?" --file aws.md
//! rag serve
//! ```

use anyhow::bail;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use leaplogic_rag::companion;
use leaplogic_rag::config;
use leaplogic_rag::diagnose;
use leaplogic_rag::engine::RagEngine;
use leaplogic_rag::logging;
use leaplogic_rag::migrate;
use leaplogic_rag::models::FileFilter;
use leaplogic_rag::server;
use leaplogic_rag::stats;

/// LeapLogic RAG CLI: answer questions over a local document collection.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "LeapLogic RAG — retrieval-augmented question answering over local documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the documents, chunks, and
    /// metadata tables. Safe to run repeatedly.
    Init,

    /// Rebuild the knowledge base.
    ///
    /// Scans `knowledge.root`, chunks and embeds every matching file, and
    /// atomically replaces the stored contents.
    Ingest,

    /// Show knowledge base statistics.
    Stats {
        /// Print the raw statistics as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the knowledge base.
    Ask {
        /// The question to answer.
        question: String,

        /// Restrict retrieval to this file. May be repeated.
        #[arg(long = "file")]
        files: Vec<String>,

        /// Print the full answer object as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the chat model name.
    Model,

    /// Check the embedding pipeline and stored vectors.
    ///
    /// Loads the embedding model, encodes sample sentences, and verifies a
    /// stored embedding decodes to its recorded dimension. Exits non-zero
    /// if any step aborts the run.
    Diagnose,

    /// Start the HTTP API server.
    ///
    /// Binds `[server].bind`. When `[server].companion_bind` is set, the
    /// hello server is started alongside it. Ctrl-C stops both.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest => {
            let root = cfg.knowledge.root.display().to_string();
            let engine = RagEngine::new(cfg).await?;
            let report = engine.reload_knowledge_base().await?;

            println!("ingest {}", root);
            println!("  documents: {}", report.documents);
            println!("  chunks: {}", report.chunks);
            println!("  skipped: {}", report.skipped);
            println!("  embedding dim: {}", report.embedding_dim);
            println!("ok");
        }
        Commands::Stats { json } => {
            let engine = RagEngine::new(cfg.clone()).await?;
            stats::run_stats(&cfg, &engine, json).await?;
        }
        Commands::Ask {
            question,
            files,
            json,
        } => {
            let engine = RagEngine::new(cfg).await?;
            let filter = (!files.is_empty()).then_some(FileFilter::Many(files));
            let answer = engine.answer_question(&question, filter, None).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}", answer.answer);
                if !answer.sources.is_empty() {
                    println!();
                    println!("Sources:");
                    for (i, source) in answer.sources.iter().enumerate() {
                        println!(
                            "  [{}] {} (chunk {}, score {:.3})",
                            i + 1,
                            source.filename,
                            source.chunk_index,
                            source.score
                        );
                    }
                }
            }
        }
        Commands::Model => {
            let engine = RagEngine::new(cfg).await?;
            println!("{}", engine.get_model_name().await?);
        }
        Commands::Diagnose => {
            let report = diagnose::run_diagnostics(&cfg).await;
            if !report.completed {
                bail!(
                    "Diagnostics did not complete: {}",
                    report.error.unwrap_or_else(|| "unknown error".to_string())
                );
            }
        }
        Commands::Serve => {
            let companion_bind = cfg.server.companion_bind.clone();
            let engine = Arc::new(RagEngine::new(cfg).await?);
            let (shutdown_tx, shutdown_rx) = watch::channel(false);

            let companion = companion_bind
                .map(|bind| companion::spawn_companion(bind, shutdown_rx.clone()));

            let signal_tx = shutdown_tx.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("shutdown requested");
                    let _ = signal_tx.send(true);
                }
            });

            let served = server::run_server(engine, shutdown_rx).await;
            let _ = shutdown_tx.send(true);

            if let Some(handle) = companion {
                match handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "companion server failed"),
                    Err(e) => tracing::error!(error = %e, "companion task panicked"),
                }
            }
            served?;
        }
    }

    Ok(())
}
