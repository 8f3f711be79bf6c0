use thiserror::Error;

use crate::types::Language;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corpus error: {0}")]
    Corpus(String),

    #[error("Embedding dimension mismatch: index expects {expected}, provider returns {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Metadata lists {metadata} chunks but the vector index holds {index} rows")]
    RowCountMismatch { metadata: usize, index: usize },

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Language not loaded: {0}")]
    LanguageNotLoaded(Language),

    #[error("Query must not be empty")]
    EmptyQuery,

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
