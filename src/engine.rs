//! The question-answering engine.
//!
//! [`RagEngine`] owns everything needed to answer a question: the vector
//! store, the embedding manager, and the chat backend. It is constructed
//! once at startup and shared behind an `Arc` by the HTTP layer and CLI.
//!
//! Reloading the knowledge base takes the write side of an internal
//! `RwLock`; answers and statistics take the read side, so a reload never
//! interleaves with retrieval.

use std::time::Instant;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::db;
use crate::embedding::EmbeddingManager;
use crate::error::RagError;
use crate::ingest;
use crate::llm::{self, ChatBackend, ChatRequest, ContextPassage};
use crate::migrate;
use crate::models::{
    Answer, AnswerMetadata, ConversationTurn, FileFilter, IngestReport, Source, Statistics,
};
use crate::search::rank_chunks;
use crate::store::VectorStore;

/// Maximum length of a source excerpt, in characters.
pub const EXCERPT_CHARS: usize = 200;

pub struct RagEngine {
    config: Config,
    store: VectorStore,
    embeddings: EmbeddingManager,
    chat: Box<dyn ChatBackend>,
    lock: RwLock<()>,
}

impl RagEngine {
    /// Connect to the database, run migrations, and load both models.
    pub async fn new(config: Config) -> Result<Self, RagError> {
        let pool = db::connect(&config).await.map_err(RagError::model_load)?;
        migrate::migrate_pool(&pool)
            .await
            .map_err(RagError::model_load)?;
        let embeddings = EmbeddingManager::new(&config.embedding).map_err(RagError::model_load)?;
        let chat = llm::create_backend(&config.llm).map_err(RagError::model_load)?;

        tracing::info!(
            embedding_model = embeddings.model_name(),
            chat_model = chat.model_name(),
            "engine ready"
        );
        Ok(Self::from_parts(
            config,
            VectorStore::new(pool),
            embeddings,
            chat,
        ))
    }

    pub fn from_parts(
        config: Config,
        store: VectorStore,
        embeddings: EmbeddingManager,
        chat: Box<dyn ChatBackend>,
    ) -> Self {
        Self {
            config,
            store,
            embeddings,
            chat,
            lock: RwLock::new(()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn answer_question(
        &self,
        question: &str,
        file_filter: Option<FileFilter>,
        history: Option<Vec<ConversationTurn>>,
    ) -> Result<Answer, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::BadRequest("question must not be empty".to_string()));
        }

        let _guard = self.lock.read().await;
        let started = Instant::now();
        let filter = file_filter.map(FileFilter::into_names).unwrap_or_default();
        let history = history.unwrap_or_default();

        let query = self
            .embeddings
            .encode_query(question)
            .await
            .map_err(RagError::engine)?;
        let candidates = self
            .store
            .load_chunks(&filter)
            .await
            .map_err(RagError::database)?;
        if let Some(stored) = candidates.iter().find(|c| c.embedding.len() != query.len()) {
            return Err(RagError::Engine(format!(
                "embedding dimension mismatch: index has {}, model produces {}; reload the knowledge base",
                stored.embedding.len(),
                query.len()
            )));
        }
        let ranked = rank_chunks(
            candidates,
            &query,
            self.config.retrieval.top_k,
            self.config.retrieval.min_score,
        );

        tracing::debug!(
            retrieved = ranked.len(),
            filter = ?filter,
            "retrieval complete"
        );

        let (answer, history_turns_used) = if ranked.is_empty() {
            (self.config.retrieval.no_context_answer.clone(), 0)
        } else {
            let max_turns = self.config.llm.max_history_turns;
            let contexts: Vec<ContextPassage> = ranked
                .iter()
                .map(|sc| ContextPassage {
                    filename: sc.chunk.filename.clone(),
                    text: sc.chunk.content.clone(),
                })
                .collect();
            let request = ChatRequest {
                messages: llm::build_messages(question, &contexts, &history, max_turns),
                question: question.to_string(),
                contexts,
            };
            let answer = self
                .chat
                .complete(&request)
                .await
                .map_err(RagError::engine)?;
            (answer, llm::history_turns_used(&history, max_turns))
        };

        let sources: Vec<Source> = ranked
            .into_iter()
            .map(|sc| Source {
                excerpt: excerpt(&sc.chunk.content),
                filename: sc.chunk.filename,
                chunk_index: sc.chunk.chunk_index,
                score: sc.score,
            })
            .collect();

        Ok(Answer {
            answer,
            metadata: AnswerMetadata {
                model: self.chat.model_name().to_string(),
                embedding_model: self.embeddings.model_name().to_string(),
                chunks_retrieved: sources.len(),
                file_filter: filter,
                history_turns_used,
                elapsed_ms: started.elapsed().as_millis() as u64,
            },
            sources,
        })
    }

    pub async fn get_statistics(&self) -> Result<Statistics, RagError> {
        let _guard = self.lock.read().await;

        let total_documents = self
            .store
            .count_documents()
            .await
            .map_err(RagError::database)?;
        let total_chunks = self
            .store
            .count_chunks()
            .await
            .map_err(RagError::database)?;
        let embedding_dim = self
            .store
            .embedding_dim()
            .await
            .map_err(RagError::database)?;
        let embedding_model = self
            .store
            .get_metadata("embedding_model")
            .await
            .map_err(RagError::database)?;
        let documents = self
            .store
            .document_stats()
            .await
            .map_err(RagError::database)?;

        Ok(Statistics {
            total_documents,
            total_chunks,
            embedding_dim,
            embedding_model,
            documents,
            database_path: self.config.db.path.display().to_string(),
        })
    }

    /// Unix timestamp of the last successful rebuild.
    pub async fn indexed_at(&self) -> Result<Option<i64>, RagError> {
        let value = self
            .store
            .get_metadata("indexed_at")
            .await
            .map_err(RagError::database)?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    pub async fn get_model_name(&self) -> Result<String, RagError> {
        Ok(self.chat.model_name().to_string())
    }

    /// Re-index `knowledge.root` from scratch.
    pub async fn reload_knowledge_base(&self) -> Result<IngestReport, RagError> {
        let _guard = self.lock.write().await;
        ingest::rebuild(&self.store, &self.embeddings, &self.config)
            .await
            .map_err(RagError::engine)
    }
}

fn excerpt(content: &str) -> String {
    let trimmed = content.trim();
    match trimmed.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => trimmed[..idx].to_string(),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ChunkingConfig, DbConfig, EmbeddingConfig, KnowledgeConfig, LlmConfig, RetrievalConfig,
        ServerConfig,
    };
    use crate::embedding::HashProvider;
    use crate::error::ErrorKind;
    use crate::llm::ExtractiveChat;
    use crate::migrate::migrate_pool;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::fs;
    use tempfile::TempDir;

    async fn test_engine(root: &std::path::Path) -> RagEngine {
        let config = Config {
            db: DbConfig {
                path: root.join("rag.sqlite"),
            },
            knowledge: KnowledgeConfig {
                root: root.to_path_buf(),
                include_globs: vec!["**/*.md".to_string()],
                exclude_globs: Vec::new(),
                follow_symlinks: false,
            },
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig {
                provider: "extractive".to_string(),
                ..LlmConfig::default()
            },
            retrieval: RetrievalConfig::default(),
            server: ServerConfig {
                bind: "127.0.0.1:0".to_string(),
                companion_bind: None,
                error_status: Default::default(),
            },
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate_pool(&pool).await.unwrap();

        RagEngine::from_parts(
            config,
            VectorStore::new(pool),
            EmbeddingManager::with_provider(Box::new(HashProvider::new(128)), 16),
            Box::new(ExtractiveChat),
        )
    }

    fn write_corpus(root: &std::path::Path) {
        fs::write(
            root.join("aws.md"),
            "Amazon S3 is an object storage service. Buckets hold objects.",
        )
        .unwrap();
        fs::create_dir_all(root.join("ml")).unwrap();
        fs::write(
            root.join("ml/gemma.md"),
            "Gemma is an AI language model. It generates text.",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_answer_cites_sources() {
        let tmp = TempDir::new().unwrap();
        write_corpus(tmp.path());
        let engine = test_engine(tmp.path()).await;
        engine.reload_knowledge_base().await.unwrap();

        let answer = engine
            .answer_question("What is Amazon S3 object storage?", None, None)
            .await
            .unwrap();
        assert!(!answer.sources.is_empty());
        assert_eq!(answer.sources[0].filename, "aws.md");
        assert!(answer.answer.contains("S3"));
        assert_eq!(answer.metadata.model, "extractive");
        assert_eq!(answer.metadata.embedding_model, "hash-128");
        assert_eq!(answer.metadata.chunks_retrieved, answer.sources.len());
    }

    #[tokio::test]
    async fn test_file_filter_restricts_sources() {
        let tmp = TempDir::new().unwrap();
        write_corpus(tmp.path());
        let engine = test_engine(tmp.path()).await;
        engine.reload_knowledge_base().await.unwrap();

        let answer = engine
            .answer_question(
                "Gemma language model storage",
                Some(FileFilter::Single("gemma.md".to_string())),
                Some(vec![ConversationTurn {
                    role: "user".to_string(),
                    content: "earlier".to_string(),
                }]),
            )
            .await
            .unwrap();
        assert!(answer
            .sources
            .iter()
            .all(|s| s.filename == "ml/gemma.md"));
        assert_eq!(answer.metadata.file_filter, vec!["gemma.md".to_string()]);
        assert_eq!(answer.metadata.history_turns_used, 1);
    }

    #[tokio::test]
    async fn test_no_context_answer() {
        let tmp = TempDir::new().unwrap();
        let engine = test_engine(tmp.path()).await;

        let answer = engine
            .answer_question("anything at all", None, None)
            .await
            .unwrap();
        assert_eq!(answer.answer, engine.config().retrieval.no_context_answer);
        assert!(answer.sources.is_empty());
        assert_eq!(answer.metadata.chunks_retrieved, 0);
    }

    #[tokio::test]
    async fn test_empty_question_is_bad_request() {
        let tmp = TempDir::new().unwrap();
        let engine = test_engine(tmp.path()).await;
        let err = engine.answer_question("   ", None, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_statistics_after_reload() {
        let tmp = TempDir::new().unwrap();
        write_corpus(tmp.path());
        let engine = test_engine(tmp.path()).await;

        let empty = engine.get_statistics().await.unwrap();
        assert_eq!(empty.total_documents, 0);
        assert_eq!(empty.embedding_dim, None);
        assert_eq!(engine.indexed_at().await.unwrap(), None);

        engine.reload_knowledge_base().await.unwrap();
        let stats = engine.get_statistics().await.unwrap();
        assert_eq!(stats.total_documents, 2);
        assert!(stats.total_chunks >= 2);
        assert_eq!(stats.embedding_dim, Some(128));
        assert!(engine.indexed_at().await.unwrap().is_some());
        assert_eq!(stats.embedding_model.as_deref(), Some("hash-128"));
        assert_eq!(stats.documents[0].filename, "aws.md");
        assert_eq!(engine.get_model_name().await.unwrap(), "extractive");
    }

    #[tokio::test]
    async fn test_model_change_without_reload_is_an_error() {
        let tmp = TempDir::new().unwrap();
        write_corpus(tmp.path());
        let engine = test_engine(tmp.path()).await;
        engine.reload_knowledge_base().await.unwrap();

        let RagEngine { config, store, .. } = engine;
        let engine = RagEngine::from_parts(
            config,
            store,
            EmbeddingManager::with_provider(Box::new(HashProvider::new(64)), 16),
            Box::new(ExtractiveChat),
        );

        let err = engine
            .answer_question("What is Amazon S3?", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Engine);
        assert!(err.to_string().contains("index has 128, model produces 64"));
    }

    #[tokio::test]
    async fn test_corrupt_dimension_is_a_codec_error() {
        let tmp = TempDir::new().unwrap();
        write_corpus(tmp.path());
        let engine = test_engine(tmp.path()).await;
        engine.reload_knowledge_base().await.unwrap();

        sqlx::query("UPDATE chunks SET embedding_dim = ?")
            .bind(i64::MAX)
            .execute(engine.store.pool())
            .await
            .unwrap();

        let err = engine
            .answer_question("What is Amazon S3?", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Codec);
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let long = "é".repeat(300);
        assert_eq!(excerpt(&long).chars().count(), EXCERPT_CHARS);
        assert_eq!(excerpt("  short  "), "short");
    }
}
