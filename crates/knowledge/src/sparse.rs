//! Okapi BM25 keyword scoring over the stored documents.

use crate::types::SearchHit;
use std::collections::{HashMap, HashSet};
use unicode_segmentation::UnicodeSegmentation;

/// Term-frequency saturation.
pub const K1: f32 = 1.2;

/// Document-length normalization.
pub const B: f32 = 0.75;

/// Lowercased unicode words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

/// Score `documents` (id, source, text) against `query` and return the top-k.
///
/// Documents that share no term with the query are dropped. Ties are broken
/// by id.
pub fn bm25_search(
    documents: &[(String, String, String)],
    query: &str,
    top_k: usize,
) -> Vec<SearchHit> {
    let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
    if query_terms.is_empty() || documents.is_empty() {
        return Vec::new();
    }

    let tokenized: Vec<Vec<String>> = documents.iter().map(|(_, _, text)| tokenize(text)).collect();

    let total_len: usize = tokenized.iter().map(Vec::len).sum();
    let avg_len = (total_len as f32 / documents.len() as f32).max(1.0);

    // Document frequency for query terms only
    let mut doc_freq: HashMap<&str, usize> = HashMap::new();
    for tokens in &tokenized {
        let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
        for term in &query_terms {
            if unique.contains(term.as_str()) {
                *doc_freq.entry(term.as_str()).or_insert(0) += 1;
            }
        }
    }

    let n = documents.len() as f32;
    let mut hits: Vec<SearchHit> = documents
        .iter()
        .zip(&tokenized)
        .filter_map(|((id, source, text), tokens)| {
            let mut term_freq: HashMap<&str, usize> = HashMap::new();
            for token in tokens {
                if query_terms.contains(token) {
                    *term_freq.entry(token.as_str()).or_insert(0) += 1;
                }
            }
            if term_freq.is_empty() {
                return None;
            }

            let len_norm = 1.0 - B + B * tokens.len() as f32 / avg_len;
            let score: f32 = term_freq
                .iter()
                .map(|(term, &tf)| {
                    let df = doc_freq.get(term).copied().unwrap_or(0) as f32;
                    let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                    let tf = tf as f32;
                    idf * tf * (K1 + 1.0) / (tf + K1 * len_norm)
                })
                .sum();

            (score > 0.0).then(|| SearchHit {
                id: id.clone(),
                score,
                content: text.clone(),
                source: source.clone(),
            })
        })
        .collect();

    crate::index::sort_hits(&mut hits);
    hits.truncate(top_k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(items: &[(&str, &str)]) -> Vec<(String, String, String)> {
        items
            .iter()
            .map(|(id, text)| (id.to_string(), format!("{}.txt", id), text.to_string()))
            .collect()
    }

    #[test]
    fn test_tokenize_lowercases_and_splits_punctuation() {
        assert_eq!(
            tokenize("Error 503: Service-Unavailable!"),
            vec!["error", "503", "service", "unavailable"]
        );
    }

    #[test]
    fn test_rare_terms_outrank_common_ones() {
        let corpus = docs(&[
            ("a", "the server returned an error"),
            ("b", "the server returned 503 service unavailable"),
            ("c", "the client sent a request"),
        ]);

        let hits = bm25_search(&corpus, "server 503", 10);
        assert_eq!(hits[0].id, "b");
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.id != "c"));
    }

    #[test]
    fn test_no_overlap_yields_nothing() {
        let corpus = docs(&[("a", "alpha beta"), ("b", "gamma delta")]);
        assert!(bm25_search(&corpus, "epsilon", 5).is_empty());
        assert!(bm25_search(&corpus, "   ", 5).is_empty());
        assert!(bm25_search(&[], "alpha", 5).is_empty());
    }

    #[test]
    fn test_shorter_document_wins_equal_term_frequency() {
        let corpus = docs(&[
            ("long", "timeout appears once among many many other unrelated words here"),
            ("short", "timeout appears once"),
        ]);
        let hits = bm25_search(&corpus, "timeout", 5);
        assert_eq!(hits[0].id, "short");
    }

    #[test]
    fn test_top_k_truncates_and_ties_break_by_id() {
        let corpus = docs(&[("b", "cache miss"), ("a", "cache miss"), ("c", "cache miss")]);
        let hits = bm25_search(&corpus, "cache", 2);
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
