//! On-disk corpus for one language: the chunk store and the vector-index
//! metadata that maps index rows back to chunks.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkMetadataRecord, ChunkRef, Language};

/// book -> chapter -> ordered chunk texts.
pub type ChunkStore = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Characters kept as a chunk preview in the metadata file.
pub const PREVIEW_CHARS: usize = 100;
/// Sort key for embedding keys that carry no parsable ordinal.
const UNPARSABLE_KEY: u64 = 999_999;

pub fn chunks_file(dir: &Path, language: Language) -> PathBuf {
    dir.join(format!("chunked_scriptures_{language}.json"))
}

pub fn metadata_file(dir: &Path, language: Language) -> PathBuf {
    dir.join(format!("faiss_metadata_{language}.json"))
}

pub fn vectors_file(dir: &Path, language: Language) -> PathBuf {
    dir.join(format!("vectors_{language}.f32"))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChapterEntry {
    #[serde(default)]
    pub embedding_key: Option<String>,
    #[serde(default)]
    pub num_chunks: usize,
    #[serde(default)]
    pub text_previews: Vec<String>,
}

/// Serialized form of `faiss_metadata_<lang>.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_dim: Option<usize>,
    #[serde(default)]
    pub structure: BTreeMap<String, BTreeMap<String, ChapterEntry>>,
}

impl MetadataFile {
    /// Describe `store` in its iteration order; `embeddings_N` keys number the chapters.
    pub fn from_store(store: &ChunkStore, model: Option<String>, embedding_dim: Option<usize>) -> Self {
        let mut structure: BTreeMap<String, BTreeMap<String, ChapterEntry>> = BTreeMap::new();
        let mut ordinal = 0usize;
        for (book, chapters) in store {
            let entries = structure.entry(book.clone()).or_default();
            for (chapter, chunks) in chapters {
                entries.insert(
                    chapter.clone(),
                    ChapterEntry {
                        embedding_key: Some(format!("embeddings_{ordinal}")),
                        num_chunks: chunks.len(),
                        text_previews: chunks.iter().map(|c| preview(c)).collect(),
                    },
                );
                ordinal += 1;
            }
        }
        Self { model, embedding_dim, structure }
    }

    /// Row-ordered records: chapters sorted by their `embeddings_N` ordinal,
    /// then `num_chunks` records per chapter.
    pub fn flatten(&self) -> Vec<ChunkMetadataRecord> {
        let mut chapters: Vec<(u64, &String, &String, &ChapterEntry)> = Vec::new();
        for (book, entries) in &self.structure {
            for (chapter, entry) in entries {
                chapters.push((embedding_ordinal(entry.embedding_key.as_deref()), book, chapter, entry));
            }
        }
        chapters.sort_by_key(|(ordinal, ..)| *ordinal);

        let mut records = Vec::new();
        for (_, book, chapter, entry) in chapters {
            for chunk_index in 0..entry.num_chunks {
                records.push(ChunkMetadataRecord {
                    book: book.clone(),
                    chapter: chapter.clone(),
                    chunk_index,
                    text_preview: entry.text_previews.get(chunk_index).cloned().unwrap_or_default(),
                });
            }
        }
        records
    }
}

fn embedding_ordinal(key: Option<&str>) -> u64 {
    key.and_then(|k| k.rsplit('_').next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(UNPARSABLE_KEY)
}

pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

/// Loaded chunk store plus row-ordered metadata for one language.
#[derive(Debug)]
pub struct Corpus {
    language: Language,
    chunks: Vec<Chunk>,
    positions: HashMap<ChunkRef, usize>,
    metadata: Vec<ChunkMetadataRecord>,
    embedding_dim: Option<usize>,
}

impl Corpus {
    pub fn new(language: Language, store: &ChunkStore, metadata: Vec<ChunkMetadataRecord>) -> Self {
        let mut chunks = Vec::new();
        let mut positions = HashMap::new();
        for (book, chapters) in store {
            for (chapter, texts) in chapters {
                for (chunk_index, text) in texts.iter().enumerate() {
                    let chunk = Chunk {
                        language,
                        book: book.clone(),
                        chapter: chapter.clone(),
                        chunk_index,
                        text: text.clone(),
                    };
                    positions.insert(chunk.chunk_ref(), chunks.len());
                    chunks.push(chunk);
                }
            }
        }
        Self { language, chunks, positions, metadata, embedding_dim: None }
    }

    /// Load `chunked_scriptures_<lang>.json` and `faiss_metadata_<lang>.json` from `dir`.
    pub fn load(dir: &Path, language: Language) -> Result<Self> {
        let store: ChunkStore = read_json(&chunks_file(dir, language))?;
        let metadata_file: MetadataFile = read_json(&metadata_file(dir, language))?;
        let metadata = metadata_file.flatten();
        let mut corpus = Self::new(language, &store, metadata);
        corpus.embedding_dim = metadata_file.embedding_dim;
        tracing::info!(language = %language, chunks = corpus.chunks.len(), rows = corpus.metadata.len(), "loaded corpus");
        Ok(corpus)
    }

    pub fn language(&self) -> Language { self.language }
    pub fn chunks(&self) -> &[Chunk] { &self.chunks }
    pub fn metadata(&self) -> &[ChunkMetadataRecord] { &self.metadata }
    pub fn embedding_dim(&self) -> Option<usize> { self.embedding_dim }
    pub fn len(&self) -> usize { self.chunks.len() }
    pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

    pub fn get(&self, chunk_ref: &ChunkRef) -> Option<&Chunk> {
        self.positions.get(chunk_ref).map(|&i| &self.chunks[i])
    }

    /// Position of a chunk in `chunks()`; used as the lexical document ordinal.
    pub fn position(&self, chunk_ref: &ChunkRef) -> Option<usize> {
        self.positions.get(chunk_ref).copied()
    }

    /// Full text for a metadata row, falling back to its preview.
    pub fn row_text(&self, record: &ChunkMetadataRecord) -> String {
        match self.get(&record.chunk_ref()) {
            Some(chunk) => chunk.text.clone(),
            None => format!("{}...", record.text_preview),
        }
    }

    /// Metadata rows must line up one-to-one with vector index rows.
    pub fn validate_rows(&self, index_rows: usize) -> Result<()> {
        if self.metadata.len() != index_rows {
            return Err(Error::RowCountMismatch { metadata: self.metadata.len(), index: index_rows });
        }
        Ok(())
    }

    /// Content hash over chunk identities and texts.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.language.code().as_bytes());
        for chunk in &self.chunks {
            hasher.update(chunk.book.as_bytes());
            hasher.update(&[0]);
            hasher.update(chunk.chapter.as_bytes());
            hasher.update(&[0]);
            hasher.update(&(chunk.chunk_index as u64).to_le_bytes());
            hasher.update(chunk.text.as_bytes());
            hasher.update(&[0xff]);
        }
        hasher.finalize().to_hex().to_string()
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(Error::NotFound(path.display().to_string()));
    }
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| Error::Corpus(format!("{}: {}", path.display(), e)))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
