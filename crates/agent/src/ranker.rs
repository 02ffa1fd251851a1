//! Hybrid ranking: weighted fusion of dense and sparse result lists.

use crate::guard::guarded;
use crate::types::{RankedDocument, Relevance};
use recall_core::{AppError, AppResult};
use recall_knowledge::{RetrievalBackend, SearchHit, SearchMode};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Queries both retrieval modes in parallel and fuses the results.
pub struct HybridRanker {
    backend: Arc<dyn RetrievalBackend>,
    timeout: Duration,
}

impl HybridRanker {
    pub fn new(backend: Arc<dyn RetrievalBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Rank documents for `query`.
    ///
    /// If one mode fails the other is used alone at full weight. Fails with
    /// [`AppError::RetrievalUnavailable`] only when both fail.
    pub async fn rank(
        &self,
        query: &str,
        top_k: usize,
        dense_weight: f32,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<RankedDocument>> {
        let (dense, sparse) = tokio::join!(
            guarded(
                "dense search",
                self.timeout,
                cancel,
                self.backend.search(query, top_k, SearchMode::Dense)
            ),
            guarded(
                "sparse search",
                self.timeout,
                cancel,
                self.backend.search(query, top_k, SearchMode::Sparse)
            ),
        );

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let ranked = match (dense, sparse) {
            (Ok(d), Ok(s)) => fuse(Some(d.as_slice()), Some(s.as_slice()), dense_weight, top_k),
            (Ok(d), Err(e)) => {
                tracing::warn!(error = %e, "Sparse retrieval failed, using dense results only");
                fuse(Some(d.as_slice()), None, dense_weight, top_k)
            }
            (Err(e), Ok(s)) => {
                tracing::warn!(error = %e, "Dense retrieval failed, using sparse results only");
                fuse(None, Some(s.as_slice()), dense_weight, top_k)
            }
            (Err(dense), Err(sparse)) => {
                return Err(AppError::RetrievalUnavailable {
                    dense: dense.to_string(),
                    sparse: sparse.to_string(),
                })
            }
        };

        tracing::debug!(query, top_k, ranked = ranked.len(), "Fused retrieval results");
        Ok(ranked)
    }
}

/// Min-max normalize raw scores to [0, 1].
///
/// A list of at most one entry, or one whose scores are all equal,
/// normalizes to 1.0 everywhere.
pub fn normalize_scores(scores: &[f32]) -> Vec<f32> {
    if scores.len() <= 1 {
        return vec![1.0; scores.len()];
    }

    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    if range <= f32::EPSILON || !range.is_finite() {
        return vec![1.0; scores.len()];
    }

    scores.iter().map(|s| (s - min) / range).collect()
}

#[derive(Default)]
struct Candidate<'a> {
    hit: Option<&'a SearchHit>,
    dense_raw: Option<f32>,
    sparse_raw: Option<f32>,
    dense_norm: f32,
    sparse_norm: f32,
    dense_rank: Option<usize>,
}

/// Fuse dense and sparse lists into one ranking of at most `top_k` documents.
///
/// `None` marks a failed list; the surviving list then carries weight 1.0.
/// Documents present in both lists are merged, keeping each axis's best score.
/// Order: fused score descending, then lower dense rank (absent last), then id.
pub fn fuse(
    dense: Option<&[SearchHit]>,
    sparse: Option<&[SearchHit]>,
    dense_weight: f32,
    top_k: usize,
) -> Vec<RankedDocument> {
    let weight = match (dense.is_some(), sparse.is_some()) {
        (true, false) => 1.0,
        (false, true) => 0.0,
        _ => dense_weight.clamp(0.0, 1.0),
    };

    let mut candidates: HashMap<&str, Candidate<'_>> = HashMap::new();

    if let Some(hits) = dense {
        let scores: Vec<f32> = hits.iter().map(|h| h.score).collect();
        for (rank, (hit, norm)) in hits.iter().zip(normalize_scores(&scores)).enumerate() {
            let c = candidates.entry(hit.id.as_str()).or_default();
            c.hit.get_or_insert(hit);
            if c.dense_rank.is_none() {
                c.dense_rank = Some(rank);
            }
            c.dense_norm = c.dense_norm.max(norm);
            c.dense_raw = Some(c.dense_raw.map_or(hit.score, |s| s.max(hit.score)));
        }
    }

    if let Some(hits) = sparse {
        let scores: Vec<f32> = hits.iter().map(|h| h.score).collect();
        for (hit, norm) in hits.iter().zip(normalize_scores(&scores)) {
            let c = candidates.entry(hit.id.as_str()).or_default();
            c.hit.get_or_insert(hit);
            c.sparse_norm = c.sparse_norm.max(norm);
            c.sparse_raw = Some(c.sparse_raw.map_or(hit.score, |s| s.max(hit.score)));
        }
    }

    let mut ranked: Vec<RankedDocument> = candidates
        .into_iter()
        .filter_map(|(id, c)| {
            let hit = c.hit?;
            Some(RankedDocument {
                id: id.to_string(),
                content: hit.content.clone(),
                source: hit.source.clone(),
                dense_score: c.dense_raw,
                sparse_score: c.sparse_raw,
                dense_rank: c.dense_rank,
                fused_score: weight * c.dense_norm + (1.0 - weight) * c.sparse_norm,
                relevance: Relevance::Unset,
            })
        })
        .collect();

    ranked.sort_by(compare_ranked);
    ranked.truncate(top_k);
    ranked
}

fn compare_ranked(a: &RankedDocument, b: &RankedDocument) -> Ordering {
    b.fused_score
        .partial_cmp(&a.fused_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| match (a.dense_rank, b.dense_rank) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.id.cmp(&b.id))
}
