//! SQLite-backed document index.
//!
//! One row per document with its embedding stored as a little-endian f32 BLOB.

use crate::types::{IndexStats, IndexedDocument, SearchHit};
use chrono::{DateTime, Utc};
use recall_core::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::cmp::Ordering;
use std::path::Path;

/// Open (creating if needed) the SQLite index database.
pub fn init_index(db_path: &Path) -> AppResult<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::Retrieval(format!("Failed to create index directory: {}", e)))?;
    }

    let conn = Connection::open(db_path)
        .map_err(|e| AppError::Retrieval(format!("Failed to open SQLite index: {}", e)))?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata TEXT,
            indexed_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source);
        "#,
    )
    .map_err(|e| AppError::Retrieval(format!("Failed to create tables: {}", e)))?;

    tracing::debug!("Initialized SQLite index at {:?}", db_path);
    Ok(conn)
}

/// Insert or replace a document.
pub fn insert_document(conn: &Connection, doc: &IndexedDocument) -> AppResult<()> {
    let metadata_json = serde_json::to_string(&doc.metadata)
        .map_err(|e| AppError::Retrieval(format!("Failed to serialize metadata: {}", e)))?;

    conn.execute(
        "INSERT OR REPLACE INTO documents (id, source, text, embedding, metadata, indexed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            doc.id,
            doc.source,
            doc.text,
            embedding_to_bytes(&doc.embedding),
            metadata_json,
            doc.indexed_at.to_rfc3339(),
        ],
    )
    .map_err(|e| AppError::Retrieval(format!("Failed to insert document: {}", e)))?;

    Ok(())
}

/// Load every document's id, source and text, ordered by id.
pub fn load_texts(conn: &Connection) -> AppResult<Vec<(String, String, String)>> {
    let mut stmt = conn
        .prepare("SELECT id, source, text FROM documents ORDER BY id")
        .map_err(|e| AppError::Retrieval(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .map_err(|e| AppError::Retrieval(format!("Failed to query documents: {}", e)))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Retrieval(format!("Failed to read document row: {}", e)))
}

/// Rank every stored document by cosine similarity to `query_embedding`.
///
/// Documents whose embedding dimension differs from the query are skipped.
/// Ties are broken by id so results are stable.
pub fn dense_search(
    conn: &Connection,
    query_embedding: &[f32],
    top_k: usize,
) -> AppResult<Vec<SearchHit>> {
    let mut stmt = conn
        .prepare("SELECT id, source, text, embedding FROM documents")
        .map_err(|e| AppError::Retrieval(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })
        .map_err(|e| AppError::Retrieval(format!("Failed to query documents: {}", e)))?;

    let mut hits = Vec::new();
    let mut skipped = 0usize;

    for row in rows {
        let (id, source, text, blob) =
            row.map_err(|e| AppError::Retrieval(format!("Failed to read document row: {}", e)))?;
        let embedding = bytes_to_embedding(&blob)?;

        if embedding.len() != query_embedding.len() {
            skipped += 1;
            continue;
        }

        hits.push(SearchHit {
            score: cosine_similarity(query_embedding, &embedding),
            id,
            content: text,
            source,
        });
    }

    if skipped > 0 {
        tracing::warn!(
            skipped,
            expected = query_embedding.len(),
            "Skipped documents with mismatched embedding dimensions"
        );
    }

    sort_hits(&mut hits);
    hits.truncate(top_k);

    tracing::debug!("Dense search returned {} hits (top-{})", hits.len(), top_k);
    Ok(hits)
}

/// Sort by score descending, then id ascending.
pub fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Get statistics for the index.
pub fn get_stats(conn: &Connection, db_path: &Path) -> AppResult<IndexStats> {
    let documents: i64 = conn
        .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
        .map_err(|e| AppError::Retrieval(format!("Failed to count documents: {}", e)))?;

    let embedding_bytes: Option<i64> = conn
        .query_row("SELECT length(embedding) FROM documents LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| AppError::Retrieval(format!("Failed to inspect embeddings: {}", e)))?;

    let last_indexed: Option<String> = conn
        .query_row("SELECT MAX(indexed_at) FROM documents", [], |row| row.get(0))
        .map_err(|e| AppError::Retrieval(format!("Failed to read index time: {}", e)))?;

    let last_indexed_at = last_indexed
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc));

    Ok(IndexStats {
        documents: documents as u64,
        embedding_dimensions: embedding_bytes.map(|b| b as usize / 4),
        db_size_bytes: std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0),
        last_indexed_at,
    })
}

/// Reset the index (delete all documents).
pub fn reset_index(conn: &Connection) -> AppResult<()> {
    conn.execute("DELETE FROM documents", [])
        .map_err(|e| AppError::Retrieval(format!("Failed to delete documents: {}", e)))?;

    tracing::info!("Reset document index");
    Ok(())
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Retrieval(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Cosine similarity; zero for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc(id: &str, text: &str, embedding: Vec<f32>) -> IndexedDocument {
        IndexedDocument {
            id: id.to_string(),
            source: format!("{}.md", id),
            text: text.to_string(),
            embedding,
            metadata: serde_json::json!({}),
            indexed_at: Utc::now(),
        }
    }

    #[test]
    fn test_dense_search_orders_by_similarity() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.sqlite");
        let conn = init_index(&path).unwrap();

        insert_document(&conn, &doc("a", "alpha", vec![1.0, 0.0, 0.0])).unwrap();
        insert_document(&conn, &doc("b", "beta", vec![0.7, 0.7, 0.0])).unwrap();
        insert_document(&conn, &doc("c", "gamma", vec![0.0, 1.0, 0.0])).unwrap();

        let hits = dense_search(&conn, &[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].id, "b");
        assert_eq!(hits[0].source, "a.md");
    }

    #[test]
    fn test_dense_search_ties_break_by_id() {
        let temp = TempDir::new().unwrap();
        let conn = init_index(&temp.path().join("index.sqlite")).unwrap();

        insert_document(&conn, &doc("z", "same", vec![1.0, 0.0])).unwrap();
        insert_document(&conn, &doc("m", "same", vec![1.0, 0.0])).unwrap();

        let hits = dense_search(&conn, &[1.0, 0.0], 5).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["m", "z"]);
    }

    #[test]
    fn test_dense_search_skips_mismatched_dimensions() {
        let temp = TempDir::new().unwrap();
        let conn = init_index(&temp.path().join("index.sqlite")).unwrap();

        insert_document(&conn, &doc("a", "alpha", vec![1.0, 0.0, 0.0])).unwrap();
        insert_document(&conn, &doc("b", "beta", vec![1.0, 0.0])).unwrap();

        let hits = dense_search(&conn, &[1.0, 0.0, 0.0], 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[test]
    fn test_stats_and_reset() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("index.sqlite");
        let conn = init_index(&path).unwrap();

        let empty = get_stats(&conn, &path).unwrap();
        assert_eq!(empty.documents, 0);
        assert!(empty.embedding_dimensions.is_none());
        assert!(empty.last_indexed_at.is_none());

        insert_document(&conn, &doc("a", "alpha", vec![1.0, 0.0, 0.0, 0.0])).unwrap();
        let stats = get_stats(&conn, &path).unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.embedding_dimensions, Some(4));
        assert!(stats.last_indexed_at.is_some());

        reset_index(&conn).unwrap();
        assert_eq!(get_stats(&conn, &path).unwrap().documents, 0);
    }

    #[test]
    fn test_embedding_bytes_round_trip_rejects_torn_blob() {
        assert!(bytes_to_embedding(&[0, 0, 0]).is_err());
        let bytes = embedding_to_bytes(&[0.5, -1.25]);
        assert_eq!(bytes_to_embedding(&bytes).unwrap(), vec![0.5, -1.25]);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 0.001);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
