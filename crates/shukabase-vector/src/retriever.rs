use std::collections::HashSet;
use std::sync::Arc;

use shukabase_core::corpus::Corpus;
use shukabase_core::traits::{EmbedMode, Embedder, VectorIndex};
use shukabase_core::{Candidate, SourceKind};

/// Outcome of embedding one query variant.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryVector {
    Ready(Vec<f32>),
    /// The provider failed; the variant contributes nothing to vector search.
    Unavailable,
}

/// Dense retrieval over one language partition.
#[derive(Clone)]
pub struct VectorRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    corpus: Arc<Corpus>,
}

impl VectorRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, corpus: Arc<Corpus>) -> Self {
        Self { embedder, index, corpus }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> { &self.index }

    /// Embed on a blocking thread; any failure degrades to `Unavailable`.
    pub async fn embed_query(&self, variant: &str) -> QueryVector {
        let embedder = self.embedder.clone();
        let text = vec![variant.to_string()];
        let result = tokio::task::spawn_blocking(move || embedder.embed(&text, EmbedMode::Query)).await;
        let vector = match result {
            Ok(Ok(mut rows)) if rows.len() == 1 => rows.remove(0),
            Ok(Ok(rows)) => {
                tracing::warn!(rows = rows.len(), "embedding provider returned wrong row count");
                return QueryVector::Unavailable;
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "query embedding failed");
                return QueryVector::Unavailable;
            }
            Err(e) => {
                tracing::warn!(error = %e, "query embedding task aborted");
                return QueryVector::Unavailable;
            }
        };
        if vector.len() != self.index.dim() {
            tracing::warn!(expected = self.index.dim(), actual = vector.len(), "query embedding has wrong width");
            return QueryVector::Unavailable;
        }
        QueryVector::Ready(self.index.normalize(&vector))
    }

    /// Search `2 * limit` neighbours (capped at the index size), drop those
    /// beyond `threshold`, resolve rows to chunks and keep the first `limit`
    /// distinct chunks.
    pub async fn search(&self, query: &QueryVector, limit: usize, threshold: Option<f32>) -> anyhow::Result<Vec<Candidate>> {
        let QueryVector::Ready(vector) = query else { return Ok(vec![]) };
        if limit == 0 { return Ok(vec![]); }
        let k = limit.saturating_mul(2).min(self.index.row_count().await?);
        if k == 0 { return Ok(vec![]); }
        let neighbours = self.index.search(vector, k).await?;
        let metadata = self.corpus.metadata();

        let mut seen = HashSet::new();
        let mut hits = Vec::new();
        for (row, distance) in neighbours {
            if threshold.is_some_and(|t| distance > t) { continue; }
            let Some(record) = metadata.get(row) else {
                tracing::debug!(row, "vector row has no metadata; skipping");
                continue;
            };
            let chunk_ref = record.chunk_ref();
            if !seen.insert(chunk_ref.clone()) { continue; }
            hits.push(Candidate {
                text: self.corpus.row_text(record),
                chunk_ref,
                raw_score: 1.0 / (1.0 + distance),
                distance: Some(distance),
                source: SourceKind::Vector,
                rank: hits.len(),
                is_exact: false,
            });
            if hits.len() >= limit { break; }
        }
        Ok(hits)
    }

    /// Embed then search. An unavailable embedding is reported as an error so
    /// callers can tell a failed source from an empty one.
    pub async fn retrieve(&self, variant: &str, limit: usize, threshold: Option<f32>) -> anyhow::Result<Vec<Candidate>> {
        match self.embed_query(variant).await {
            QueryVector::Unavailable => Err(anyhow::anyhow!("query embedding unavailable")),
            ready => self.search(&ready, limit, threshold).await,
        }
    }
}
