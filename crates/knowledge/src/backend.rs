//! The retrieval seam consumed by the answering loop, and its SQLite adapter.

use crate::embeddings::EmbeddingProvider;
use crate::index;
use crate::sparse;
use crate::types::{IndexStats, IndexedDocument, SearchHit, SearchMode};
use chrono::Utc;
use recall_core::{AppError, AppResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A searchable document collection.
///
/// Results are sorted by raw score descending. Repeating a search with the
/// same query and mode returns the same list while the index is unchanged.
#[async_trait::async_trait]
pub trait RetrievalBackend: Send + Sync {
    async fn search(&self, query: &str, top_k: usize, mode: SearchMode)
        -> AppResult<Vec<SearchHit>>;
}

/// Local backend over the SQLite document index.
///
/// Each search opens its own connection on a blocking thread, so one backend
/// can serve many sessions at once.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    db_path: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SqliteBackend {
    /// Open the index at `db_path`, creating the schema if needed.
    pub fn open(db_path: impl Into<PathBuf>, embedder: Arc<dyn EmbeddingProvider>) -> AppResult<Self> {
        let db_path = db_path.into();
        index::init_index(&db_path)?;
        Ok(Self { db_path, embedder })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Embed and store one document, replacing any document with the same id.
    pub async fn index_document(
        &self,
        id: &str,
        source: &str,
        text: &str,
        metadata: serde_json::Value,
    ) -> AppResult<()> {
        let embedding = self.embedder.embed(text).await?;
        let doc = IndexedDocument {
            id: id.to_string(),
            source: source.to_string(),
            text: text.to_string(),
            embedding,
            metadata,
            indexed_at: Utc::now(),
        };

        self.with_connection(move |conn| index::insert_document(conn, &doc))
            .await
    }

    pub async fn stats(&self) -> AppResult<IndexStats> {
        let path = self.db_path.clone();
        self.with_connection(move |conn| index::get_stats(conn, &path))
            .await
    }

    pub async fn reset(&self) -> AppResult<()> {
        self.with_connection(index::reset_index).await
    }

    async fn with_connection<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> AppResult<T> + Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = index::init_index(&path)?;
            f(&conn)
        })
        .await
        .map_err(|e| AppError::Retrieval(format!("Index task failed: {}", e)))?
    }
}

#[async_trait::async_trait]
impl RetrievalBackend for SqliteBackend {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        mode: SearchMode,
    ) -> AppResult<Vec<SearchHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let hits = match mode {
            SearchMode::Dense => {
                let query_embedding = self.embedder.embed(query).await?;
                self.with_connection(move |conn| index::dense_search(conn, &query_embedding, top_k))
                    .await?
            }
            SearchMode::Sparse => {
                let query = query.to_string();
                self.with_connection(move |conn| {
                    let documents = index::load_texts(conn)?;
                    Ok(sparse::bm25_search(&documents, &query, top_k))
                })
                .await?
            }
        };

        tracing::debug!(mode = %mode, hits = hits.len(), top_k, "Backend search complete");
        Ok(hits)
    }
}
