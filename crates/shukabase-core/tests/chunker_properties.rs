use proptest::prelude::*;

use shukabase_core::chunker::split_text;

fn strip_ws(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn corpus_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            "[a-z]{1,12}",
            "[а-я]{1,10}",
            Just(".".to_string()),
            Just("!".to_string()),
            Just("?".to_string()),
            Just(" ".to_string()),
            Just("\n".to_string()),
        ],
        0..200,
    )
    .prop_map(|parts| parts.join(" "))
}

proptest! {
    #[test]
    fn chunks_are_bounded_non_empty_substrings(text in corpus_text(), size in 1usize..80, overlap in 0usize..100) {
        let chunks = split_text(&text, size, overlap);
        for chunk in &chunks {
            prop_assert!(!chunk.is_empty());
            prop_assert_eq!(chunk.trim(), chunk.as_str());
            prop_assert!(chunk.chars().count() <= size);
            prop_assert!(text.contains(chunk.as_str()));
        }
        if text.trim().is_empty() {
            prop_assert!(chunks.is_empty());
        }
    }

    #[test]
    fn chunk_count_is_bounded(text in corpus_text(), size in 1usize..80, overlap in 0usize..100) {
        let len = text.chars().count();
        let step = if overlap >= size { (size / 2).max(1) } else { size - overlap };
        let chunks = split_text(&text, size, overlap);
        prop_assert!(chunks.len() <= len / step + 100 + len / size + 1);
    }

    #[test]
    fn without_overlap_chunks_reconstruct_text(text in corpus_text(), size in 1usize..80) {
        let chunks = split_text(&text, size, 0);
        prop_assert_eq!(strip_ws(&chunks.concat()), strip_ws(&text));
    }
}
