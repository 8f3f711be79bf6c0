//! Scripture citation detection and exact verse lookup.
//!
//! Recognizes `<book> <chapter>.<verse>` and `<book> <canto>.<chapter>.<verse>`
//! (`:` is accepted as the two-number separator) with book names in Russian
//! or English, full or abbreviated.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use shukabase_core::corpus::Corpus;
use shukabase_core::types::EXACT_MATCH_SCORE;
use shukabase_core::{Candidate, SourceKind, VerseReference};

const TEXT_MARKER_WINDOW: usize = 50;
const RANGE_MARKER_WINDOW: usize = 20;

static THREE_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<book>.*?)\s*(?P<a>\d+)\.(?P<b>\d+)\.(?P<verse>\d+)\s*$").expect("three-part reference pattern")
});
static TWO_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<book>.*?)\s*(?P<chapter>\d+)[.:](?P<verse>\d+)\s*$").expect("two-part reference pattern")
});

const BOOK_NAMES: &[(&str, &str)] = &[
    ("bg", "bg"),
    ("bhagavad gita", "bg"),
    ("bhagavad-gita", "bg"),
    ("bhagavad gita as it is", "bg"),
    ("gita", "bg"),
    ("бг", "bg"),
    ("бхагавад гита", "bg"),
    ("бхагавад-гита", "bg"),
    ("бхагавадгита", "bg"),
    ("гита", "bg"),
    ("sb", "sb"),
    ("srimad bhagavatam", "sb"),
    ("srimad-bhagavatam", "sb"),
    ("bhagavatam", "sb"),
    ("шб", "sb"),
    ("шримад бхагаватам", "sb"),
    ("шримад-бхагаватам", "sb"),
    ("бхагаватам", "sb"),
    ("cc", "cc"),
    ("caitanya caritamrta", "cc"),
    ("sri caitanya caritamrta", "cc"),
    ("chaitanya charitamrita", "cc"),
    ("чч", "cc"),
    ("чайтанья чаритамрита", "cc"),
    ("шри чайтанья чаритамрита", "cc"),
    ("iso", "iso"),
    ("isopanisad", "iso"),
    ("sri isopanisad", "iso"),
    ("ишо", "iso"),
    ("ишопанишад", "iso"),
    ("шри ишопанишад", "iso"),
    ("noi", "noi"),
    ("nectar of instruction", "noi"),
    ("нектар наставлений", "noi"),
    ("nod", "nod"),
    ("nectar of devotion", "nod"),
    ("нектар преданности", "nod"),
];

pub struct ReferenceDetector {
    books: HashMap<String, &'static str>,
    /// Word count of the longest book name.
    max_book_words: usize,
}

impl ReferenceDetector {
    pub fn new() -> Self {
        let books: HashMap<String, &'static str> = BOOK_NAMES.iter().map(|(name, code)| (normalize_book(name), *code)).collect();
        let max_book_words = books.keys().map(|name| name.split(' ').filter(|w| !w.is_empty()).count()).max().unwrap_or(1);
        Self { books, max_book_words }
    }

    /// Parse a citation from the whole query; `None` if it is not one.
    pub fn detect(&self, query: &str) -> Option<VerseReference> {
        let query = query.trim().to_lowercase();
        if let Some(caps) = THREE_PART.captures(&query) {
            if let Some(book_code) = self.lookup_book(&caps["book"]) {
                return Some(VerseReference {
                    book_code: book_code.to_string(),
                    chapter: format!("{}.{}", &caps["a"], &caps["b"]),
                    verse: caps["verse"].parse().ok()?,
                });
            }
        }
        let caps = TWO_PART.captures(&query)?;
        let book_code = self.lookup_book(&caps["book"])?;
        Some(VerseReference {
            book_code: book_code.to_string(),
            chapter: caps["chapter"].to_string(),
            verse: caps["verse"].parse().ok()?,
        })
    }

    // The trailing words of the prefix, longest first.
    fn lookup_book(&self, prefix: &str) -> Option<&'static str> {
        let normalized = normalize_book(prefix);
        let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();
        (1..=self.max_book_words.min(words.len()))
            .rev()
            .find_map(|n| self.books.get(&words[words.len() - n..].join(" ")).copied())
    }

    /// Chunks of `corpus` in the cited book and chapter whose text carries a
    /// verse marker for the cited verse. Metadata order, unique by identity.
    pub fn find_verse(&self, reference: &VerseReference, corpus: &Corpus) -> Vec<Candidate> {
        let wanted_chapter = normalize_chapter(&reference.chapter);
        let mut seen = HashSet::new();
        let mut hits = Vec::new();
        for record in corpus.metadata() {
            if !record.book.eq_ignore_ascii_case(&reference.book_code) { continue; }
            if normalize_chapter(&record.chapter) != wanted_chapter { continue; }
            let text = corpus.row_text(record);
            if !has_verse_marker(&text, reference.verse) { continue; }
            let chunk_ref = record.chunk_ref();
            if !seen.insert(chunk_ref.clone()) { continue; }
            hits.push(Candidate {
                chunk_ref,
                text,
                raw_score: EXACT_MATCH_SCORE,
                distance: None,
                source: SourceKind::ExactVerse,
                rank: hits.len(),
                is_exact: true,
            });
        }
        hits
    }
}

impl Default for ReferenceDetector {
    fn default() -> Self { Self::new() }
}

fn normalize_book(name: &str) -> String {
    name.to_lowercase()
        .replace(['-', '_'], " ")
        .replace(['.', ',', ':'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `02.013`, `2/13` and `2\13` all become `2.13`.
pub fn normalize_chapter(chapter: &str) -> String {
    chapter
        .split(['.', '/', '\\'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let trimmed = part.trim().trim_start_matches('0');
            if trimmed.is_empty() { "0" } else { trimmed }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// `TEXT n` / `ТЕКСТ n` near the start, a leading `n.`, or an `n-` range start.
pub fn has_verse_marker(text: &str, verse: u32) -> bool {
    let verse = verse.to_string();

    let head: String = text.chars().take(TEXT_MARKER_WINDOW).collect::<String>().to_lowercase();
    for marker in ["text", "текст"] {
        let mut offset = 0;
        while let Some(at) = head[offset..].find(marker) {
            let start = offset + at;
            let end = start + marker.len();
            offset = end;
            if head[..start].chars().next_back().is_some_and(char::is_alphanumeric) { continue; }
            let after = &head[end..];
            if !after.starts_with(char::is_whitespace) { continue; }
            let digits: String = after.trim_start().chars().take_while(char::is_ascii_digit).collect();
            if digits == verse { return true; }
        }
    }

    if let Some(after) = text.strip_prefix(verse.as_str()) {
        if after.starts_with('.') { return true; }
    }

    let range_head: String = text.chars().take(RANGE_MARKER_WINDOW).collect();
    let needle = format!("{verse}-");
    let mut offset = 0;
    while let Some(at) = range_head[offset..].find(&needle) {
        let start = offset + at;
        let preceded_by_digit = range_head[..start].chars().next_back().is_some_and(|c| c.is_ascii_digit());
        if !preceded_by_digit { return true; }
        offset = start + needle.len();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use shukabase_core::corpus::{ChunkStore, MetadataFile};
    use shukabase_core::Language;

    fn reference(code: &str, chapter: &str, verse: u32) -> Option<VerseReference> {
        Some(VerseReference { book_code: code.to_string(), chapter: chapter.to_string(), verse })
    }

    #[test]
    fn detects_two_part_references() {
        let d = ReferenceDetector::new();
        assert_eq!(d.detect("Бхагавад гита 2.13"), reference("bg", "2", 13));
        assert_eq!(d.detect("bg 2:13"), reference("bg", "2", 13));
        assert_eq!(d.detect("БГ 18.66"), reference("bg", "18", 66));
        assert_eq!(d.detect("Bhagavad-Gita 4.7"), reference("bg", "4", 7));
        assert_eq!(d.detect("Bhagavad Gita As It Is 2.13"), reference("bg", "2", 13));
        assert_eq!(d.detect("read bhagavad gita as it is 2.13"), reference("bg", "2", 13));
        assert_eq!(d.detect("what does bg 2.13 say about bg 2.20"), reference("bg", "2", 20));
    }

    #[test]
    fn detects_three_part_references() {
        let d = ReferenceDetector::new();
        assert_eq!(d.detect("SB 1.2.3"), reference("sb", "1.2", 3));
        assert_eq!(d.detect("шримад-бхагаватам 10.14.58"), reference("sb", "10.14", 58));
    }

    #[test]
    fn rejects_non_references() {
        let d = ReferenceDetector::new();
        assert_eq!(d.detect("what is the soul"), None);
        assert_eq!(d.detect("2.13"), None);
        assert_eq!(d.detect("unknown book 2.13"), None);
        assert_eq!(d.detect("bg 2.13 and more"), None);
    }

    #[test]
    fn chapter_normalization() {
        assert_eq!(normalize_chapter("02"), "2");
        assert_eq!(normalize_chapter("1/02"), "1.2");
        assert_eq!(normalize_chapter("10\\014"), "10.14");
        assert_eq!(normalize_chapter("0"), "0");
    }

    #[test]
    fn verse_markers_are_digit_bounded() {
        assert!(has_verse_marker("TEXT 13 As the embodied soul", 13));
        assert!(has_verse_marker("ТЕКСТ 13 Как воплощенная душа", 13));
        assert!(!has_verse_marker("TEXT 130 something", 13));
        assert!(!has_verse_marker("TEXT 1 something", 13));
        assert!(has_verse_marker("13. dehino 'smin", 13));
        assert!(!has_verse_marker("113. dehino", 13));
        assert!(has_verse_marker("Verses 13-14 explain", 13));
        assert!(!has_verse_marker("Verses 113-114 explain", 13));
        assert!(!has_verse_marker("context 13 but no marker", 13));
    }

    #[test]
    fn find_verse_matches_book_chapter_and_marker() {
        let mut store = ChunkStore::new();
        let bg = store.entry("bg".into()).or_default();
        bg.insert("02".into(), vec!["TEXT 12 Never was there a time".into(), "TEXT 13 As the embodied soul".into()]);
        bg.insert("3".into(), vec!["TEXT 13 The devotees of the Lord".into()]);
        let rows = MetadataFile::from_store(&store, None, None).flatten();
        let corpus = Corpus::new(Language::En, &store, rows);

        let d = ReferenceDetector::new();
        let hits = d.find_verse(&VerseReference { book_code: "bg".into(), chapter: "2".into(), verse: 13 }, &corpus);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_ref.chapter, "02");
        assert_eq!(hits[0].chunk_ref.chunk_index, 1);
        assert!(hits[0].is_exact);
        assert_eq!(hits[0].raw_score, EXACT_MATCH_SCORE);

        let none = d.find_verse(&VerseReference { book_code: "sb".into(), chapter: "2".into(), verse: 13 }, &corpus);
        assert!(none.is_empty());
    }
}
