//! Retrieval type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which scoring the backend should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Embedding similarity
    Dense,
    /// Keyword (BM25) relevance
    Sparse,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dense => "dense",
            Self::Sparse => "sparse",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scored result of a backend search.
///
/// Raw scores are only comparable within a single (query, mode) result list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub content: String,
    pub source: String,
}

/// A document row as stored by the upstream producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub id: String,

    /// Source descriptor (file path, URL, ...)
    pub source: String,

    pub text: String,

    pub embedding: Vec<f32>,

    #[serde(default)]
    pub metadata: serde_json::Value,

    pub indexed_at: DateTime<Utc>,
}

/// Statistics about a document index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub documents: u64,

    /// Dimension of the stored embeddings, if any are stored
    pub embedding_dimensions: Option<usize>,

    pub db_size_bytes: u64,

    pub last_indexed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_mode_serialization() {
        assert_eq!(serde_json::to_string(&SearchMode::Dense).unwrap(), "\"dense\"");
        assert_eq!(
            serde_json::from_str::<SearchMode>("\"sparse\"").unwrap(),
            SearchMode::Sparse
        );
        assert_eq!(SearchMode::Sparse.to_string(), "sparse");
    }
}
