use async_trait::async_trait;

use crate::types::Candidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMode {
    /// Short search text.
    Query,
    /// Passage text stored in the index.
    Document,
}

/// Blocking embedding provider; async callers run it on a blocking thread.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed(&self, texts: &[String], mode: EmbedMode) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Nearest-neighbour search over row-ordered vectors.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn dim(&self) -> usize;
    async fn row_count(&self) -> anyhow::Result<usize>;
    /// `(row, distance)` pairs, nearest first. Distances are squared L2.
    async fn search(&self, query: &[f32], k: usize) -> anyhow::Result<Vec<(usize, f32)>>;

    fn normalize(&self, vector: &[f32]) -> Vec<f32> {
        l2_normalize(vector)
    }
}

/// Pointwise relevance scorer for (query, document) pairs.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// One score per document, in input order.
    async fn score(&self, query: &str, documents: &[String]) -> anyhow::Result<Vec<f32>>;
}

/// A synchronous retrieval source bound to one language partition.
pub trait Retriever: Send + Sync {
    fn retrieve(&self, query: &str, limit: usize) -> anyhow::Result<Vec<Candidate>>;
}

pub fn l2_normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return vector.to_vec();
    }
    vector.iter().map(|x| x / norm).collect()
}
