//! Embedding pipeline self-check for `rag diagnose`.
//!
//! Runs four sequential steps, printing a `✓`/`✗` line for each:
//!
//! 1. Load the embedding model.
//! 2. Encode three sample sentences and report the batch shape.
//! 3. Count documents and chunks in the database.
//! 4. If any chunks exist, decode one stored embedding and check that its
//!    width matches the recorded `embedding_dim`.
//!
//! A failure in steps 1-3 aborts the run. A decode failure in step 4 is
//! recorded but the run still completes.

use serde::Serialize;

use crate::codec;
use crate::config::Config;
use crate::db;
use crate::embedding::EmbeddingManager;
use crate::store::VectorStore;

pub const SAMPLE_TEXTS: [&str; 3] = [
    "This is a test document about AWS S3",
    "Gemma is an AI language model",
    "Vector databases store embeddings efficiently",
];

const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiagnosticReport {
    pub model_loaded: bool,
    pub encode_shape: Option<(usize, usize)>,
    pub document_count: Option<i64>,
    pub chunk_count: Option<i64>,
    pub sample: Option<SampleCheck>,
    pub error: Option<String>,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleCheck {
    pub preview: String,
    pub decoded_dim: Option<usize>,
    pub stored_dim: i64,
    pub matches: bool,
}

fn banner() -> String {
    "=".repeat(60)
}

pub async fn run_diagnostics(config: &Config) -> DiagnosticReport {
    let mut report = DiagnosticReport::default();

    println!("{}", banner());
    println!("Testing Embedding System");
    println!("{}", banner());

    println!("\n1. Loading embedding model...");
    if !config.embedding.is_enabled() {
        let msg = "embedding provider is disabled; set [embedding].provider";
        println!("✗ Error loading embedding model: {}", msg);
        report.error = Some(msg.to_string());
        return report;
    }
    let manager = match EmbeddingManager::new(&config.embedding) {
        Ok(manager) => {
            println!("✓ Embedding model loaded successfully");
            report.model_loaded = true;
            manager
        }
        Err(e) => {
            println!("✗ Error loading embedding model: {:#}", e);
            report.error = Some(format!("{:#}", e));
            return report;
        }
    };

    println!("\n2. Testing text encoding...");
    let texts: Vec<String> = SAMPLE_TEXTS.iter().map(|s| s.to_string()).collect();
    match manager.encode(&texts).await {
        Ok(batch) => {
            let shape = batch.shape();
            println!("✓ Successfully encoded {} texts", texts.len());
            println!("  Embedding shape: ({}, {})", shape.0, shape.1);
            println!("  Embedding dimension: {}", shape.1);
            report.encode_shape = Some(shape);
        }
        Err(e) => {
            println!("✗ Error encoding texts: {:#}", e);
            report.error = Some(format!("{:#}", e));
            return report;
        }
    }

    println!("\n3. Checking vector database...");
    if let Err(e) = check_database(config, &mut report).await {
        println!("✗ Error accessing vector database: {:#}", e);
        report.error = Some(format!("{:#}", e));
        return report;
    }

    println!("\n{}", banner());
    println!("✓ Embedding system test completed!");
    println!("{}", banner());
    report.completed = true;
    report
}

async fn check_database(config: &Config, report: &mut DiagnosticReport) -> anyhow::Result<()> {
    let store = VectorStore::new(db::connect(config).await?);
    let result = inspect_store(&store, report).await;
    store.pool().close().await;
    result
}

async fn inspect_store(store: &VectorStore, report: &mut DiagnosticReport) -> anyhow::Result<()> {
    let doc_count = store.count_documents().await?;
    println!("✓ Documents in database: {}", doc_count);
    report.document_count = Some(doc_count);

    let chunk_count = store.count_chunks().await?;
    println!("✓ Chunks in database: {}", chunk_count);
    report.chunk_count = Some(chunk_count);

    if chunk_count > 0 {
        println!("\n4. Testing chunk retrieval and embedding conversion...");
        if let Some(raw) = store.sample_chunk().await? {
            let preview: String = raw.chunk_content.chars().take(PREVIEW_CHARS).collect();
            println!("✓ Retrieved sample chunk: {}...", preview);

            let mut check = SampleCheck {
                preview,
                decoded_dim: None,
                stored_dim: raw.embedding_dim,
                matches: false,
            };

            let decoded = usize::try_from(raw.embedding_dim)
                .map_err(|_| codec::DecodeError::NegativeDimension(raw.embedding_dim))
                .and_then(|dim| codec::decode_batch(&raw.embedding, dim));
            match decoded {
                Ok(matrix) => {
                    let width = matrix.first().map(Vec::len).unwrap_or(0);
                    println!("✓ Successfully converted embedding blob");
                    println!("  Embedding shape: ({}, {})", matrix.len(), width);
                    println!("  Expected dimension: {}", raw.embedding_dim);

                    check.decoded_dim = Some(width);
                    check.matches = width as i64 == raw.embedding_dim;
                    if check.matches {
                        println!("✓ Embedding dimension matches!");
                    } else {
                        println!("✗ Dimension mismatch: {} != {}", width, raw.embedding_dim);
                    }
                }
                Err(e) => {
                    println!("✗ Error converting embedding: {}", e);
                    report.error = Some(e.to_string());
                }
            }
            report.sample = Some(check);
        }
    }

    Ok(())
}
