use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::corpus::ChunkStore;

/// Sentence terminators preferred as cut points.
const TERMINATORS: [char; 3] = ['.', '!', '?'];
/// How far back from the hard cut we look for a terminator.
const BOUNDARY_WINDOW: usize = 100;

/// Sizes are counted in characters, not bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 2048, overlap: 256 }
    }
}

#[derive(Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self { Self { config } }

    pub fn config(&self) -> &ChunkingConfig { &self.config }

    pub fn split(&self, text: &str) -> Vec<String> {
        split_text(text, self.config.chunk_size, self.config.overlap)
    }

    /// Chunk every chapter of a parsed library: book -> chapter -> text.
    pub fn chunk_parsed(&self, books: &BTreeMap<String, BTreeMap<String, String>>) -> (ChunkStore, usize) {
        let mut store = ChunkStore::new();
        let mut total = 0;
        for (book, chapters) in books {
            let mut book_chunks = BTreeMap::new();
            let mut book_total = 0;
            for (chapter, text) in chapters {
                let chunks = self.split(text);
                if chunks.is_empty() { continue; }
                book_total += chunks.len();
                book_chunks.insert(chapter.clone(), chunks);
            }
            if book_chunks.is_empty() { continue; }
            tracing::info!(book = %book, chapters = book_chunks.len(), chunks = book_total, "chunked book");
            total += book_total;
            store.insert(book.clone(), book_chunks);
        }
        (store, total)
    }

    /// Read `<root>/<book>/<chapter...>.txt` files and chunk them.
    pub fn chunk_directory(&self, root: &Path) -> Result<(ChunkStore, usize)> {
        let files = list_txt_files(root);
        if files.is_empty() {
            tracing::warn!(dir = %root.display(), "no .txt files found");
            return Ok((ChunkStore::new(), 0));
        }
        let mut books: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (file_index, file_path) in files.iter().enumerate() {
            tracing::debug!(file = %file_path.display(), n = file_index + 1, of = files.len(), "reading");
            let content = read_file_content(file_path)?;
            let (book, chapter) = book_and_chapter(file_path, root);
            books.entry(book).or_default().insert(chapter, content);
        }
        let (store, total) = self.chunk_parsed(&books);
        tracing::info!(files = files.len(), chunks = total, "processed directory");
        Ok((store, total))
    }
}

/// Split `text` into overlapping chunks of at most `chunk_size` characters,
/// cutting at a sentence terminator or a space when one is close to the cut.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    if len <= chunk_size {
        let trimmed = text.trim();
        return if trimmed.is_empty() { vec![] } else { vec![trimmed.to_string()] };
    }

    let step = if overlap >= chunk_size { (chunk_size / 2).max(1) } else { chunk_size - overlap };
    let max_iterations = len / step + 100;

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut iterations = 0;
    while start < len {
        iterations += 1;
        let exhausted = iterations > max_iterations;
        let mut end = (start + chunk_size).min(len);
        if end < len && !exhausted {
            end = boundary(&chars, start, end);
        }
        push_trimmed(&mut chunks, &chars[start..end]);
        if end >= len { break; }
        if exhausted {
            // Out of budget: plain no-overlap windows until the text is consumed.
            start = end;
            continue;
        }
        let old_start = start;
        start = end.saturating_sub(overlap);
        if start <= old_start + step / 10 { start = end; }
    }
    chunks
}

// Returns a cut in (start, end]; never moves the cut before `start + 1`.
fn boundary(chars: &[char], start: usize, end: usize) -> usize {
    let search_start = start.max(end.saturating_sub(BOUNDARY_WINDOW));
    if let Some(i) = (search_start..end).rev().find(|&i| TERMINATORS.contains(&chars[i])) {
        return i + 1;
    }
    if let Some(space) = (start + 1..end).rev().find(|&i| chars[i] == ' ') {
        return space;
    }
    end
}

fn push_trimmed(chunks: &mut Vec<String>, slice: &[char]) {
    let piece: String = slice.iter().collect();
    let trimmed = piece.trim();
    if !trimmed.is_empty() { chunks.push(trimmed.to_string()); }
}

fn read_file_content(file_path: &Path) -> Result<String> {
    match fs::read_to_string(file_path) {
        Ok(content) => Ok(content),
        Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
    }
}

fn book_and_chapter(file_path: &Path, root: &Path) -> (String, String) {
    let relative = file_path.strip_prefix(root).unwrap_or(file_path).with_extension("");
    let parts: Vec<String> = relative.components().map(|c| c.as_os_str().to_string_lossy().to_string()).collect();
    match parts.as_slice() {
        [] => ("misc".to_string(), "0".to_string()),
        [only] => ("misc".to_string(), only.clone()),
        [book, rest @ ..] => (book.clone(), rest.join("/")),
    }
}

fn list_txt_files(root: &Path) -> Vec<PathBuf> {
    let mut txt_files = Vec::new();
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
        let path = entry.path(); if path.extension().and_then(|s| s.to_str()) == Some("txt") { txt_files.push(path.to_path_buf()); }
    }
    txt_files.sort(); txt_files
}
