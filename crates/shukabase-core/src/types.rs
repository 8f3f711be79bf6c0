use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Score carried by exact verse matches; dominates any reciprocal-rank sum.
pub const EXACT_MATCH_SCORE: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ru,
    En,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Ru, Language::En];

    pub fn code(self) -> &'static str {
        match self {
            Language::Ru => "ru",
            Language::En => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ru" => Ok(Language::Ru),
            "en" => Ok(Language::En),
            other => Err(Error::UnsupportedLanguage(other.to_string())),
        }
    }
}

/// Identity of a chunk inside one language partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkRef {
    pub book: String,
    pub chapter: String,
    pub chunk_index: usize,
}

impl ChunkRef {
    pub fn new(book: impl Into<String>, chapter: impl Into<String>, chunk_index: usize) -> Self {
        Self { book: book.into(), chapter: chapter.into(), chunk_index }
    }
}

impl fmt::Display for ChunkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.book, self.chapter, self.chunk_index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub language: Language,
    pub book: String,
    pub chapter: String,
    pub chunk_index: usize,
    pub text: String,
}

impl Chunk {
    pub fn chunk_ref(&self) -> ChunkRef {
        ChunkRef::new(self.book.clone(), self.chapter.clone(), self.chunk_index)
    }
}

/// One row of the vector-index metadata; row position equals the vector row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadataRecord {
    pub book: String,
    pub chapter: String,
    pub chunk_index: usize,
    pub text_preview: String,
}

impl ChunkMetadataRecord {
    pub fn chunk_ref(&self) -> ChunkRef {
        ChunkRef::new(self.book.clone(), self.chapter.clone(), self.chunk_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Vector,
    Bm25,
    Substring,
    ExactVerse,
}

/// A ranked hit produced by one retrieval source for one query variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub chunk_ref: ChunkRef,
    pub text: String,
    pub raw_score: f32,
    pub distance: Option<f32>,
    pub source: SourceKind,
    pub rank: usize,
    pub is_exact: bool,
}

/// Best (lowest) rank a fused chunk held in each contributing source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRanks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bm25: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substring: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact_verse: Option<usize>,
}

impl SourceRanks {
    pub fn get(&self, source: SourceKind) -> Option<usize> {
        match source {
            SourceKind::Vector => self.vector,
            SourceKind::Bm25 => self.bm25,
            SourceKind::Substring => self.substring,
            SourceKind::ExactVerse => self.exact_verse,
        }
    }

    pub fn record(&mut self, source: SourceKind, rank: usize) {
        let slot = match source {
            SourceKind::Vector => &mut self.vector,
            SourceKind::Bm25 => &mut self.bm25,
            SourceKind::Substring => &mut self.substring,
            SourceKind::ExactVerse => &mut self.exact_verse,
        };
        *slot = Some(slot.map_or(rank, |r| r.min(rank)));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    #[serde(flatten)]
    pub chunk_ref: ChunkRef,
    pub text: String,
    pub fusion_score: f32,
    pub per_source_ranks: SourceRanks,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    pub is_exact: bool,
}

impl FusedResult {
    pub fn book(&self) -> &str {
        &self.chunk_ref.book
    }

    pub fn chapter(&self) -> &str {
        &self.chunk_ref.chapter
    }

    /// Exact verse hits bypass fusion and keep their sentinel score.
    pub fn from_exact(candidate: Candidate) -> Self {
        let mut ranks = SourceRanks::default();
        ranks.record(SourceKind::ExactVerse, candidate.rank);
        Self {
            chunk_ref: candidate.chunk_ref,
            text: candidate.text,
            fusion_score: EXACT_MATCH_SCORE,
            per_source_ranks: ranks,
            final_score: Some(1.0),
            distance: None,
            is_exact: true,
        }
    }
}

/// A parsed scripture citation such as `bg 2.13` or `sb 1.2.3`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerseReference {
    pub book_code: String,
    pub chapter: String,
    pub verse: u32,
}
