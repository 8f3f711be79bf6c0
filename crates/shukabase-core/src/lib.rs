//! shukabase-core
//!
//! Domain types, configuration, the corpus chunker and the corpus files shared
//! by the retrieval crates. Collaborator seams (embedding provider, vector
//! index, cross-encoder) are declared in `traits`.

pub mod chunker;
pub mod config;
pub mod corpus;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use types::{Candidate, Chunk, ChunkMetadataRecord, ChunkRef, FusedResult, Language, SourceKind, SourceRanks, VerseReference};
