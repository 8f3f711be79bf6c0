//! shukabase-vector
//!
//! Dense retrieval: row-ordered vector indexes (an in-memory flat L2 index
//! and a LanceDB table) and the retriever that embeds a query variant,
//! searches, thresholds and resolves rows back to corpus chunks.
pub mod flat;
pub mod lance;
pub mod retriever;
pub mod schema;

pub use flat::FlatIndex;
pub use lance::LanceIndex;
pub use retriever::{QueryVector, VectorRetriever};
