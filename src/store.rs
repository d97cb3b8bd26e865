//! SQLite-backed vector store.
//!
//! Documents and their chunks live in two tables; each chunk row carries its
//! text, the embedding encoded with [`codec::encode`](crate::codec::encode),
//! and the embedding's dimensionality. Similarity search is brute force over
//! decoded rows (see [`search`](crate::search)).

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};

use crate::codec;
use crate::models::{Chunk, Document, DocumentStats, StoredChunk};

/// A chunk prepared for insertion: text plus its embedding.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A document with all of its embedded chunks, ready to be written.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub document: Document,
    pub chunks: Vec<EmbeddedChunk>,
}

/// One raw chunk row, undecoded.
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub chunk_content: String,
    pub embedding: Vec<u8>,
    pub embedding_dim: i64,
}

pub struct VectorStore {
    pool: SqlitePool,
}

impl VectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn count_documents(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn count_chunks(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn document_stats(&self) -> Result<Vec<DocumentStats>> {
        let rows = sqlx::query("SELECT filename, chunk_count FROM documents ORDER BY filename")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| DocumentStats {
                filename: row.get("filename"),
                chunk_count: row.get("chunk_count"),
            })
            .collect())
    }

    /// Dimensionality of the first stored chunk, if any.
    pub async fn embedding_dim(&self) -> Result<Option<i64>> {
        let dim: Option<i64> =
            sqlx::query_scalar("SELECT embedding_dim FROM chunks ORDER BY rowid LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(dim)
    }

    /// Fetch one chunk row as stored, without decoding.
    pub async fn sample_chunk(&self) -> Result<Option<RawChunk>> {
        let row = sqlx::query(
            r#"
            SELECT c.chunk_content, c.embedding, c.embedding_dim
            FROM chunks c
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| RawChunk {
            chunk_content: row.get("chunk_content"),
            embedding: row.get("embedding"),
            embedding_dim: row.get("embedding_dim"),
        }))
    }

    /// Load and decode every chunk, optionally restricted to the given files.
    ///
    /// A filter name matches a document when it equals the stored filename
    /// or the filename's last path component. An empty filter loads all.
    pub async fn load_chunks(&self, file_filter: &[String]) -> Result<Vec<StoredChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, d.filename, c.chunk_index, c.chunk_content, c.embedding, c.embedding_dim
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            ORDER BY d.filename, c.chunk_index
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut chunks = Vec::with_capacity(rows.len());
        for row in &rows {
            let filename: String = row.get("filename");
            if !file_filter.is_empty() && !matches_filter(&filename, file_filter) {
                continue;
            }

            let id: String = row.get("id");
            let blob: Vec<u8> = row.get("embedding");
            let dim: i64 = row.get("embedding_dim");
            let embedding = codec::decode_stored(&blob, dim)
                .with_context(|| format!("Corrupt embedding for chunk {}", id))?;

            chunks.push(StoredChunk {
                id,
                filename,
                chunk_index: row.get("chunk_index"),
                content: row.get("chunk_content"),
                embedding,
            });
        }

        Ok(chunks)
    }

    /// Replace the whole knowledge base in one transaction.
    ///
    /// Either every record is written or the previous contents are kept.
    pub async fn replace_all(
        &self,
        records: &[DocumentRecord],
        embedding_model: &str,
        embedding_dim: usize,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM documents")
            .execute(&mut *tx)
            .await?;

        for record in records {
            let doc = &record.document;
            sqlx::query(
                r#"
                INSERT INTO documents (id, filename, content_hash, chunk_count, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&doc.id)
            .bind(&doc.filename)
            .bind(&doc.content_hash)
            .bind(doc.chunk_count)
            .bind(doc.created_at)
            .execute(&mut *tx)
            .await?;

            for embedded in &record.chunks {
                let chunk = &embedded.chunk;
                let blob = codec::encode(&embedded.embedding);
                sqlx::query(
                    r#"
                    INSERT INTO chunks (id, document_id, chunk_index, chunk_content,
                                        embedding, embedding_dim, hash)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&chunk.id)
                .bind(&chunk.document_id)
                .bind(chunk.chunk_index)
                .bind(&chunk.text)
                .bind(&blob)
                .bind(embedded.embedding.len() as i64)
                .bind(&chunk.hash)
                .execute(&mut *tx)
                .await?;
            }
        }

        for (key, value) in [
            ("embedding_model", embedding_model.to_string()),
            ("embedding_dim", embedding_dim.to_string()),
            ("indexed_at", chrono::Utc::now().timestamp().to_string()),
        ] {
            sqlx::query(
                r#"
                INSERT INTO metadata (key, value) VALUES (?, ?)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }
}

/// True if `filename` is named by any entry of `filter`.
pub fn matches_filter(filename: &str, filter: &[String]) -> bool {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    filter.iter().any(|name| name == filename || name == base)
}
