//! Retrieval backends for Recall.
//!
//! The answering loop only sees the [`RetrievalBackend`] trait: a query, a
//! result count and a search mode in, scored documents out. This crate ships
//! one local implementation on SQLite, with dense search by cosine similarity
//! over stored embeddings and sparse search by Okapi BM25.

pub mod backend;
pub mod embeddings;
pub mod index;
pub mod sparse;
pub mod types;

// Re-export commonly used types
pub use backend::{RetrievalBackend, SqliteBackend};
pub use embeddings::{create_provider, EmbeddingProvider};
pub use types::{IndexStats, IndexedDocument, SearchHit, SearchMode};
