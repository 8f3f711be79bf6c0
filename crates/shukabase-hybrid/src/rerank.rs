//! Cross-encoder re-scoring of fused results.

use std::sync::Arc;
use std::time::Duration;

use shukabase_core::traits::CrossEncoder;
use shukabase_core::FusedResult;

#[derive(Clone, Default)]
pub struct RerankDispatcher {
    scorer: Option<Arc<dyn CrossEncoder>>,
}

impl RerankDispatcher {
    pub fn new(scorer: Option<Arc<dyn CrossEncoder>>) -> Self {
        Self { scorer }
    }

    pub fn is_enabled(&self) -> bool { self.scorer.is_some() }

    /// Exact hits pass through first with `final_score = 1.0`; the rest are
    /// scored in one batch and sorted by score. Any scorer problem keeps the
    /// fused order.
    pub async fn rerank(&self, query: &str, fused: Vec<FusedResult>, limit: usize, deadline: Option<Duration>) -> Vec<FusedResult> {
        let (mut exact, rest): (Vec<_>, Vec<_>) = fused.into_iter().partition(|r| r.is_exact);
        for r in &mut exact { r.final_score = Some(1.0); }

        let rest = match &self.scorer {
            Some(scorer) if !rest.is_empty() => score_group(scorer.as_ref(), query, rest, deadline).await,
            _ => rest,
        };

        let mut out = exact;
        out.extend(rest);
        out.truncate(limit);
        out
    }
}

async fn score_group(scorer: &dyn CrossEncoder, query: &str, mut group: Vec<FusedResult>, deadline: Option<Duration>) -> Vec<FusedResult> {
    let documents: Vec<String> = group.iter().map(|r| r.text.clone()).collect();
    let call = scorer.score(query, &documents);
    let outcome = match deadline {
        Some(budget) => match tokio::time::timeout(budget, call).await {
            Ok(res) => res,
            Err(_) => {
                tracing::warn!(budget_ms = budget.as_millis() as u64, "reranker exceeded deadline; keeping fused order");
                return group;
            }
        },
        None => call.await,
    };
    let scores = match outcome {
        Ok(scores) => scores,
        Err(e) => {
            tracing::warn!(error = %e, "reranker failed; keeping fused order");
            return group;
        }
    };
    if scores.len() != group.len() {
        tracing::warn!(expected = group.len(), actual = scores.len(), "reranker returned wrong score count; keeping fused order");
        return group;
    }
    for (r, s) in group.iter_mut().zip(scores) { r.final_score = Some(s); }
    // Stable: equal scores keep fused order.
    group.sort_by(|a, b| b.final_score.unwrap_or(f32::MIN).total_cmp(&a.final_score.unwrap_or(f32::MIN)));
    group
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shukabase_core::{Candidate, ChunkRef, SourceKind, SourceRanks};

    fn result(chapter: &str, text: &str, score: f32) -> FusedResult {
        FusedResult {
            chunk_ref: ChunkRef::new("bg", chapter, 0),
            text: text.to_string(),
            fusion_score: score,
            per_source_ranks: SourceRanks::default(),
            final_score: None,
            distance: None,
            is_exact: false,
        }
    }

    fn exact(chapter: &str) -> FusedResult {
        FusedResult::from_exact(Candidate {
            chunk_ref: ChunkRef::new("bg", chapter, 0),
            text: "TEXT 1".into(),
            raw_score: 100.0,
            distance: None,
            source: SourceKind::ExactVerse,
            rank: 0,
            is_exact: true,
        })
    }

    /// Scores each document by its length.
    struct LengthScorer;

    #[async_trait]
    impl CrossEncoder for LengthScorer {
        async fn score(&self, _query: &str, documents: &[String]) -> anyhow::Result<Vec<f32>> {
            Ok(documents.iter().map(|d| d.len() as f32).collect())
        }
    }

    struct BrokenScorer;

    #[async_trait]
    impl CrossEncoder for BrokenScorer {
        async fn score(&self, _query: &str, _documents: &[String]) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("connection refused")
        }
    }

    struct ShortScorer;

    #[async_trait]
    impl CrossEncoder for ShortScorer {
        async fn score(&self, _query: &str, _documents: &[String]) -> anyhow::Result<Vec<f32>> {
            Ok(vec![0.5])
        }
    }

    /// NaN for the first document, length for the rest.
    struct NanScorer;

    #[async_trait]
    impl CrossEncoder for NanScorer {
        async fn score(&self, _query: &str, documents: &[String]) -> anyhow::Result<Vec<f32>> {
            Ok(documents.iter().enumerate().map(|(i, d)| if i == 0 { f32::NAN } else { d.len() as f32 }).collect())
        }
    }

    struct SlowScorer;

    #[async_trait]
    impl CrossEncoder for SlowScorer {
        async fn score(&self, _query: &str, documents: &[String]) -> anyhow::Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![1.0; documents.len()])
        }
    }

    fn fused() -> Vec<FusedResult> {
        vec![result("1", "a", 0.03), result("2", "bbb", 0.02), result("3", "cc", 0.01)]
    }

    fn chapters(results: &[FusedResult]) -> Vec<&str> {
        results.iter().map(|r| r.chapter()).collect()
    }

    #[tokio::test]
    async fn reorders_by_scorer() {
        let d = RerankDispatcher::new(Some(Arc::new(LengthScorer)));
        let out = d.rerank("q", fused(), 10, None).await;
        assert_eq!(chapters(&out), vec!["2", "3", "1"]);
        assert_eq!(out[0].final_score, Some(3.0));
    }

    #[tokio::test]
    async fn exact_group_bypasses_scorer_and_leads() {
        let d = RerankDispatcher::new(Some(Arc::new(LengthScorer)));
        let mut input = fused();
        input.push(exact("9"));
        let out = d.rerank("q", input, 2, None).await;
        assert_eq!(chapters(&out), vec!["9", "2"]);
        assert_eq!(out[0].final_score, Some(1.0));
    }

    #[tokio::test]
    async fn failures_keep_fused_order() {
        let scorers: [Arc<dyn CrossEncoder>; 2] = [Arc::new(BrokenScorer), Arc::new(ShortScorer)];
        for scorer in scorers {
            let out = RerankDispatcher::new(Some(scorer)).rerank("q", fused(), 10, None).await;
            assert_eq!(chapters(&out), vec!["1", "2", "3"]);
            assert!(out.iter().all(|r| r.final_score.is_none()));
        }
    }

    #[tokio::test]
    async fn nan_scores_sort_without_panicking() {
        let d = RerankDispatcher::new(Some(Arc::new(NanScorer)));
        let out = d.rerank("q", fused(), 10, None).await;
        let order = chapters(&out);
        assert_eq!(order.len(), 3);
        let pos = |c: &str| order.iter().position(|x| *x == c);
        assert!(pos("2") < pos("3"));
    }

    #[tokio::test]
    async fn deadline_keeps_fused_order() {
        let d = RerankDispatcher::new(Some(Arc::new(SlowScorer)));
        let out = d.rerank("q", fused(), 2, Some(Duration::from_millis(20))).await;
        assert_eq!(chapters(&out), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn absent_scorer_truncates_only() {
        let out = RerankDispatcher::default().rerank("q", fused(), 1, None).await;
        assert_eq!(chapters(&out), vec!["1"]);
    }
}
