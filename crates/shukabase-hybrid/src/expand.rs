//! Dictionary-driven query expansion.
//!
//! Each language has a small table of canonical terms and their synonyms.
//! A query token that fuzzily matches any word of an entry produces one
//! variant per other word of that entry, substituted at the token's position.

use shukabase_core::Language;

pub const MAX_VARIANTS: usize = 5;
pub const SIMILARITY_CUTOFF: f32 = 0.8;

type Dictionary = &'static [(&'static str, &'static [&'static str])];

const RUSSIAN: Dictionary = &[
    ("любовь", &["преданность", "бхакти", "дружба", "привязанность"]),
    ("бог", &["кришна", "верховный", "абсолют", "божество"]),
    ("душа", &["атма", "дух", "сознание", "сущность"]),
    ("знание", &["джняна", "мудрость", "понимание", "осознание"]),
    ("йога", &["практика", "медитация", "дисциплина", "путь"]),
    ("карма", &["действие", "деяние", "следствие", "судьба"]),
    ("освобождение", &["мокша", "спасение", "свобода", "выход"]),
    ("мир", &["материальный", "вселенная", "временный", "преходящий"]),
];

const ENGLISH: Dictionary = &[
    ("love", &["devotion", "bhakti", "affection", "attachment"]),
    ("god", &["krishna", "supreme", "absolute", "deity"]),
    ("soul", &["atma", "spirit", "consciousness", "essence"]),
    ("knowledge", &["jnana", "wisdom", "understanding", "realization"]),
    ("yoga", &["practice", "meditation", "discipline", "path"]),
    ("karma", &["action", "deed", "consequence", "fate"]),
    ("liberation", &["moksha", "salvation", "freedom", "release"]),
    ("world", &["material", "universe", "temporary", "transient"]),
];

pub fn dictionary(language: Language) -> Dictionary {
    match language {
        Language::Ru => RUSSIAN,
        Language::En => ENGLISH,
    }
}

#[derive(Debug, Clone)]
pub struct QueryExpander {
    max_variants: usize,
    cutoff: f32,
}

impl Default for QueryExpander {
    fn default() -> Self {
        Self { max_variants: MAX_VARIANTS, cutoff: SIMILARITY_CUTOFF }
    }
}

impl QueryExpander {
    pub fn new(max_variants: usize, cutoff: f32) -> Self {
        Self { max_variants: max_variants.max(1), cutoff }
    }

    /// Original query first, then unique rewrites, at most `max_variants` total.
    pub fn expand(&self, query: &str, language: Language) -> Vec<String> {
        let mut variants = vec![query.to_string()];
        let tokens: Vec<&str> = query.split_whitespace().collect();
        let dict = dictionary(language);

        for (pos, token) in tokens.iter().enumerate() {
            let word = normalize_token(token);
            if word.is_empty() { continue; }
            for (term, synonyms) in dict {
                let words = || std::iter::once(*term).chain(synonyms.iter().copied());
                if !words().any(|w| similarity(&word, w) >= self.cutoff) { continue; }
                for replacement in words() {
                    if replacement == word { continue; }
                    let variant = substitute(&tokens, pos, replacement);
                    if !variants.contains(&variant) { variants.push(variant); }
                    if variants.len() >= self.max_variants { return variants; }
                }
            }
        }
        variants
    }
}

fn normalize_token(token: &str) -> String {
    token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase()
}

fn substitute(tokens: &[&str], pos: usize, replacement: &str) -> String {
    tokens
        .iter()
        .enumerate()
        .map(|(i, t)| if i == pos { replacement } else { *t })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized Levenshtein similarity over chars, in [0, 1].
pub fn similarity(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 { return 1.0; }
    1.0 - levenshtein(&a, &b) as f32 / longest as f32
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}
