//! Semantic retrieval over decoded chunk embeddings.
//!
//! Scores every candidate chunk by cosine similarity against the query
//! vector, drops those with no positive similarity or below `min_score`,
//! and keeps the best `top_k`.
//! Ties are broken by filename then chunk index so results are stable.

use crate::embedding::cosine_similarity;
use crate::models::StoredChunk;

/// A chunk with its similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: StoredChunk,
    pub score: f32,
}

pub fn rank_chunks(
    candidates: Vec<StoredChunk>,
    query: &[f32],
    top_k: usize,
    min_score: f32,
) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .map(|chunk| {
            let score = cosine_similarity(&chunk.embedding, query);
            ScoredChunk { chunk, score }
        })
        .filter(|sc| sc.score > 0.0 && sc.score >= min_score)
        .collect();

    // Sort: score desc, filename asc, chunk_index asc (deterministic)
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk.filename.cmp(&b.chunk.filename))
            .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });

    scored.truncate(top_k);
    scored
}
