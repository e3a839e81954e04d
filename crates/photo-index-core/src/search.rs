//! Semantic photo search.
//!
//! The core search operates entirely through the [`Store`] trait, with no
//! database or configuration dependencies. The calling application embeds
//! the query text with the same model used for photo descriptions and
//! passes the vector in.
//!
//! # Ranking
//!
//! 1. Validate `limit` and the query dimensionality.
//! 2. Score every stored photo by cosine similarity to the query.
//! 3. Stable sort by score (desc); ties keep record order.
//! 4. Truncate to `limit`.
//!
//! Ranking sits behind [`PhotoRanker`] so an approximate index can replace
//! the brute-force scan without changing the contract.

use serde::Serialize;

use crate::embedding::cosine_similarity;
use crate::error::{check_dims, IndexError, Result};
use crate::models::{Metadata, PhotoRecord};
use crate::store::Store;

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub photo_id: String,
    pub description: String,
    pub metadata: Metadata,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
    /// `1 - score`.
    pub distance: f32,
}

/// Orders candidate photos against a query embedding.
pub trait PhotoRanker: Send + Sync {
    /// Return `(record position, similarity)` pairs, best first, at most
    /// `limit` long. Every photo embedding has already been dimension-checked.
    fn rank(&self, query: &[f32], photos: &[PhotoRecord], limit: usize) -> Vec<(usize, f32)>;
}

/// Exhaustive O(N·d) cosine scan.
#[derive(Debug, Default, Clone, Copy)]
pub struct BruteForceRanker;

impl PhotoRanker for BruteForceRanker {
    fn rank(&self, query: &[f32], photos: &[PhotoRecord], limit: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = photos
            .iter()
            .enumerate()
            .map(|(i, p)| (i, cosine_similarity(query, &p.embedding)))
            .collect();
        // sort_by is stable, so equal scores stay in record order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(limit);
        scored
    }
}

/// Rank every stored photo against `query_vec` with [`BruteForceRanker`].
pub async fn search<S: Store + ?Sized>(
    store: &S,
    query_vec: &[f32],
    limit: usize,
) -> Result<Vec<SearchHit>> {
    search_with(store, &BruteForceRanker, query_vec, limit).await
}

/// Rank every stored photo against `query_vec` with a custom ranker.
pub async fn search_with<S, R>(
    store: &S,
    ranker: &R,
    query_vec: &[f32],
    limit: usize,
) -> Result<Vec<SearchHit>>
where
    S: Store + ?Sized,
    R: PhotoRanker + ?Sized,
{
    if limit == 0 {
        return Err(IndexError::precondition("search limit must be positive"));
    }
    let dims = store.dims().photo;
    check_dims("query embedding", dims, query_vec.len())?;

    let photos = store.get_all_photos().await?;
    for p in &photos {
        check_dims(format!("photo {}", p.id), dims, p.embedding.len())?;
    }

    let ranked = ranker.rank(query_vec, &photos, limit);
    let mut photos: Vec<Option<PhotoRecord>> = photos.into_iter().map(Some).collect();

    Ok(ranked
        .into_iter()
        .filter_map(|(pos, score)| {
            let p = photos.get_mut(pos)?.take()?;
            Some(SearchHit {
                photo_id: p.id,
                description: p.description,
                metadata: p.metadata,
                score,
                distance: 1.0 - score,
            })
        })
        .collect())
}
