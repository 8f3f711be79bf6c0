//! shukabase-text
//!
//! Keyword retrieval over one language partition: a persisted Tantivy BM25
//! index with stemming analyzers (`lexical`) and a literal, case-insensitive
//! substring counter (`substring`).
pub mod tantivy_utils;
pub mod lexical;
pub mod substring;

pub use lexical::LexicalIndex;
pub use substring::SubstringRetriever;
