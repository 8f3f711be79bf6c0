//! shukabase-hybrid
//!
//! The query pipeline: citation short-circuit, dictionary expansion, dense
//! and keyword retrieval per variant, reciprocal-rank fusion and optional
//! cross-encoder reranking, behind `SearchEngine::search`.
pub mod cross_encoder;
pub mod engine;
pub mod expand;
pub mod fusion;
pub mod reference;
pub mod rerank;

pub use cross_encoder::HttpCrossEncoder;
pub use engine::{LanguageBundle, SearchEngine, SearchFailure, SearchOutcome, SearchRequest, SearchResponse};
pub use expand::QueryExpander;
pub use fusion::{fuse, RRF_K};
pub use reference::ReferenceDetector;
pub use rerank::RerankDispatcher;
