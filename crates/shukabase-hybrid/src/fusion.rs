// Reciprocal Rank Fusion over per-source candidate lists.

use std::collections::HashMap;

use shukabase_core::types::EXACT_MATCH_SCORE;
use shukabase_core::{Candidate, ChunkRef, FusedResult, SourceRanks};

/// RRF damping constant.
pub const RRF_K: f32 = 60.0;

/// Contribution of a 0-based rank.
pub fn rrf_score(rank: usize) -> f32 {
    1.0 / (RRF_K + rank as f32 + 1.0)
}

/// Merge one source's per-variant lists into a single ranked list.
/// Each chunk keeps its best rank; ties keep first-seen order.
pub fn flatten_variants(lists: &[Vec<Candidate>]) -> Vec<Candidate> {
    let mut best: Vec<Candidate> = Vec::new();
    let mut index: HashMap<ChunkRef, usize> = HashMap::new();
    for list in lists {
        for candidate in list {
            match index.get(&candidate.chunk_ref) {
                Some(&i) => {
                    if candidate.rank < best[i].rank { best[i] = candidate.clone(); }
                }
                None => {
                    index.insert(candidate.chunk_ref.clone(), best.len());
                    best.push(candidate.clone());
                }
            }
        }
    }
    best.sort_by_key(|c| c.rank);
    for (rank, c) in best.iter_mut().enumerate() { c.rank = rank; }
    best
}

/// Fuse exact hits and retrieval lists into at most `limit` results.
///
/// Exact hits are seeded with `EXACT_MATCH_SCORE` and never accumulate RRF.
/// Every other chunk scores `sum 1/(RRF_K + rank + 1)` over the sources it
/// appears in. Ties keep first-seen order.
pub fn fuse(
    exact: &[Candidate],
    vector: &[Vec<Candidate>],
    lexical: &[Vec<Candidate>],
    substring: &[Vec<Candidate>],
    limit: usize,
) -> Vec<FusedResult> {
    let mut entries: Vec<FusedResult> = Vec::new();
    let mut index: HashMap<ChunkRef, usize> = HashMap::new();

    for hit in exact {
        if index.contains_key(&hit.chunk_ref) { continue; }
        index.insert(hit.chunk_ref.clone(), entries.len());
        entries.push(FusedResult::from_exact(hit.clone()));
    }

    for list in [flatten_variants(vector), flatten_variants(lexical), flatten_variants(substring)] {
        for candidate in list {
            let i = *index.entry(candidate.chunk_ref.clone()).or_insert_with(|| {
                entries.push(FusedResult {
                    chunk_ref: candidate.chunk_ref.clone(),
                    text: candidate.text.clone(),
                    fusion_score: 0.0,
                    per_source_ranks: SourceRanks::default(),
                    final_score: None,
                    distance: None,
                    is_exact: false,
                });
                entries.len() - 1
            });
            let result = &mut entries[i];
            result.per_source_ranks.record(candidate.source, candidate.rank);
            if let Some(d) = candidate.distance {
                result.distance = Some(result.distance.map_or(d, |old| old.min(d)));
            }
            if result.text.is_empty() { result.text = candidate.text.clone(); }
            if !result.is_exact { result.fusion_score += rrf_score(candidate.rank); }
        }
    }

    let mut fused = entries;
    // Stable sort: equal scores keep first-seen order.
    fused.sort_by(|a, b| b.fusion_score.total_cmp(&a.fusion_score));
    fused.truncate(limit);
    debug_assert!(fused.iter().all(|r| !r.is_exact || r.fusion_score == EXACT_MATCH_SCORE));
    fused
}
