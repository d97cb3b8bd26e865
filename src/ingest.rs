//! Knowledge base rebuild.
//!
//! Scans `knowledge.root`, chunks each file, embeds every chunk, and
//! replaces the store contents in a single transaction. Any embedding
//! failure aborts the rebuild before the store is touched, so the previous
//! knowledge base stays queryable.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::connector_fs;
use crate::embedding::EmbeddingManager;
use crate::models::{Document, IngestReport, KnowledgeFile};
use crate::store::{DocumentRecord, EmbeddedChunk, VectorStore};

pub async fn rebuild(
    store: &VectorStore,
    manager: &EmbeddingManager,
    config: &Config,
) -> Result<IngestReport> {
    let files = connector_fs::scan_knowledge(&config.knowledge)?;
    tracing::info!(
        root = %config.knowledge.root.display(),
        files = files.len(),
        "rebuilding knowledge base"
    );

    let mut report = IngestReport {
        embedding_dim: manager.dims(),
        ..IngestReport::default()
    };
    let mut records = Vec::with_capacity(files.len());

    for file in &files {
        match prepare_document(file, manager, config).await? {
            Some(record) => {
                report.documents += 1;
                report.chunks += record.chunks.len();
                records.push(record);
            }
            None => {
                tracing::debug!(filename = %file.filename, "skipping empty file");
                report.skipped += 1;
            }
        }
    }

    store
        .replace_all(&records, manager.model_name(), manager.dims())
        .await
        .context("Failed to write knowledge base")?;

    tracing::info!(
        documents = report.documents,
        chunks = report.chunks,
        skipped = report.skipped,
        "knowledge base rebuilt"
    );
    Ok(report)
}

async fn prepare_document(
    file: &KnowledgeFile,
    manager: &EmbeddingManager,
    config: &Config,
) -> Result<Option<DocumentRecord>> {
    if file.body.trim().is_empty() {
        return Ok(None);
    }

    let doc_id = Uuid::new_v4().to_string();
    let chunks = chunk_text(
        &doc_id,
        &file.body,
        config.chunking.max_tokens,
        config.chunking.overlap_tokens,
    );
    if chunks.is_empty() {
        return Ok(None);
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let batch = manager
        .encode(&texts)
        .await
        .with_context(|| format!("Failed to embed {}", file.filename))?;

    let document = Document {
        id: doc_id,
        filename: file.filename.clone(),
        content_hash: content_hash(&file.body),
        chunk_count: chunks.len() as i64,
        created_at: chrono::Utc::now().timestamp(),
    };

    let chunks = chunks
        .into_iter()
        .zip(batch.vectors)
        .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding })
        .collect();

    Ok(Some(DocumentRecord { document, chunks }))
}

fn content_hash(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}
