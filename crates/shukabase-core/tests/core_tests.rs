use std::fs;
use std::io::Write;
use tempfile::TempDir;

use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use shukabase_core::chunker::{Chunker, ChunkingConfig};
use shukabase_core::config::{Config, Settings, VectorBackend};
use shukabase_core::corpus::{self, ChunkStore, Corpus, MetadataFile};
use shukabase_core::{Error, Language};

#[test]
fn chunk_directory_maps_book_and_chapter_from_path() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir_all(dir.join("bg")).unwrap();
    let mut f = fs::File::create(dir.join("bg").join("2.txt")).unwrap();
    writeln!(f, "TEXT 13 As the embodied soul continuously passes.").unwrap();
    fs::write(dir.join("loose.txt"), "orphan text").unwrap();

    let (store, total) = Chunker::default().chunk_directory(dir).expect("chunk directory");

    assert_eq!(total, 2);
    assert_eq!(store["bg"]["2"], vec!["TEXT 13 As the embodied soul continuously passes.".to_string()]);
    assert_eq!(store["misc"]["loose"], vec!["orphan text".to_string()]);
}

#[test]
fn chunk_directory_empty_dir_yields_nothing() {
    let tmp = TempDir::new().unwrap();
    let (store, total) = Chunker::default().chunk_directory(tmp.path()).expect("chunk directory");
    assert!(store.is_empty());
    assert_eq!(total, 0);
}

#[test]
fn corpus_load_reads_store_and_metadata() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    let chunker = Chunker::new(ChunkingConfig { chunk_size: 40, overlap: 5 });
    let mut store = ChunkStore::new();
    store.entry("sb".into()).or_default().insert("1.1".into(), chunker.split("Om namo bhagavate vasudevaya. Janmady asya yato 'nvayad itaratas carthesv abhijnah svarat."));
    corpus::write_json(&corpus::chunks_file(dir, Language::En), &store).unwrap();
    corpus::write_json(&corpus::metadata_file(dir, Language::En), &MetadataFile::from_store(&store, None, Some(16))).unwrap();

    let corpus = Corpus::load(dir, Language::En).expect("load corpus");

    assert_eq!(corpus.language(), Language::En);
    assert!(corpus.len() > 1);
    assert_eq!(corpus.metadata().len(), corpus.len());
    assert_eq!(corpus.embedding_dim(), Some(16));
    assert!(corpus.validate_rows(corpus.len()).is_ok());
}

#[test]
fn corpus_load_missing_files_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let err = Corpus::load(tmp.path(), Language::Ru).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn corpus_load_rejects_malformed_json() {
    let tmp = TempDir::new().unwrap();
    fs::write(corpus::chunks_file(tmp.path(), Language::Ru), "{not json").unwrap();
    let err = Corpus::load(tmp.path(), Language::Ru).unwrap_err();
    assert!(matches!(err, Error::Corpus(_)));
}

#[test]
fn settings_defaults_and_overrides() {
    let figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::string(
        r#"
        [search]
        top_k = 9
        [corpus]
        vector_backend = "lance"
        languages = ["ru"]
        "#,
    ));
    let settings = Config::from_figment(figment).settings().expect("settings");

    assert_eq!(settings.search.top_k, 9);
    assert_eq!(settings.search.deadline_ms, 10_000);
    assert_eq!(settings.chunking.chunk_size, 2048);
    assert_eq!(settings.chunking.overlap, 256);
    assert_eq!(settings.corpus.vector_backend, VectorBackend::Lance);
    assert_eq!(settings.languages(), vec![Language::Ru]);
}

#[test]
fn settings_reject_unknown_language() {
    let figment = Figment::from(Serialized::defaults(Settings::default()))
        .merge(Toml::string("[corpus]\nlanguages = [\"de\"]\n"));
    assert!(Config::from_figment(figment).settings().is_err());
}

#[test]
fn language_parsing() {
    assert_eq!(" RU ".parse::<Language>().unwrap(), Language::Ru);
    assert!(matches!("fr".parse::<Language>(), Err(Error::UnsupportedLanguage(code)) if code == "fr"));
}
