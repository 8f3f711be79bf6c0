use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use shukabase_core::config::Settings;
use shukabase_core::corpus::{chunks_file, metadata_file, write_json, ChunkStore, Corpus, MetadataFile};
use shukabase_core::traits::{CrossEncoder, EmbedMode, Embedder};
use shukabase_core::{Error, Language};
use shukabase_embed::HashEmbedder;
use shukabase_hybrid::{LanguageBundle, SearchEngine, SearchRequest};
use shukabase_vector::FlatIndex;

const DIM: usize = 256;

fn english_store() -> ChunkStore {
    let mut store = ChunkStore::new();
    let bg = store.entry("bg".into()).or_default();
    bg.insert(
        "2".into(),
        vec![
            "Text 13 As the embodied soul continuously passes, in this body, from boyhood to youth to old age.".into(),
            "Text 14 The nonpermanent appearance of happiness and distress.".into(),
            "Text 20 For the soul there is neither birth nor death at any time.".into(),
        ],
    );
    bg.insert("1".into(), vec!["Text 20 Arjuna took up his bow and prepared to shoot his arrows.".into()]);
    bg.insert("4".into(), vec!["Text 37 As a blazing fire turns firewood to ashes, the fire of knowledge burns all karma.".into()]);
    store
}

fn corpus_for(language: Language, store: &ChunkStore) -> Arc<Corpus> {
    let rows = MetadataFile::from_store(store, None, Some(DIM)).flatten();
    Arc::new(Corpus::new(language, store, rows))
}

fn vectors(corpus: &Corpus) -> Vec<Vec<f32>> {
    let texts: Vec<String> = corpus.metadata().iter().map(|r| corpus.row_text(r)).collect();
    HashEmbedder::new(DIM).embed(&texts, EmbedMode::Document).expect("embed")
}

fn bundle(tmp: &Path, language: Language, store: &ChunkStore) -> LanguageBundle {
    let corpus = corpus_for(language, store);
    let rows = vectors(&corpus);
    let index = FlatIndex::new(DIM, &rows).expect("index");
    LanguageBundle::from_parts(corpus, Arc::new(HashEmbedder::new(DIM)), Arc::new(index), rows.len(), &tmp.join(language.code()))
        .expect("bundle")
}

fn engine(tmp: &Path, scorer: Option<Arc<dyn CrossEncoder>>) -> SearchEngine {
    SearchEngine::new(vec![bundle(tmp, Language::En, &english_store())], scorer, Settings::default().search)
}

fn request(query: &str) -> SearchRequest {
    SearchRequest::new(query, Language::En)
}

/// Counts calls and prefers documents mentioning Arjuna.
#[derive(Default)]
struct ArjunaScorer {
    calls: AtomicUsize,
}

#[async_trait]
impl CrossEncoder for ArjunaScorer {
    async fn score(&self, _query: &str, documents: &[String]) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(documents.iter().map(|d| if d.contains("Arjuna") { 0.9 } else { 0.1 }).collect())
    }
}

struct DownScorer;

#[async_trait]
impl CrossEncoder for DownScorer {
    async fn score(&self, _query: &str, _documents: &[String]) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("503 service unavailable")
    }
}

#[tokio::test]
async fn cyrillic_citation_returns_only_the_exact_verse() {
    let tmp = TempDir::new().unwrap();
    let scorer = Arc::new(ArjunaScorer::default());
    let engine = engine(tmp.path(), Some(scorer.clone()));

    let response = engine.search(request("Бхагавад гита 2.13")).await;
    let outcome = response.outcome().expect("success");

    assert_eq!(outcome.count, 1);
    let hit = &outcome.results[0];
    assert_eq!((hit.book(), hit.chapter(), hit.chunk_ref.chunk_index), ("bg", "2", 0));
    assert!(hit.is_exact);
    assert_eq!(hit.per_source_ranks.exact_verse, Some(0));
    assert_eq!(hit.per_source_ranks.vector, None);
    assert_eq!(hit.final_score, Some(1.0));
    assert_eq!(outcome.query_variants, vec!["Бхагавад гита 2.13".to_string()]);
    assert_eq!(scorer.calls.load(Ordering::SeqCst), 0, "exact hits skip reranking");
}

#[tokio::test]
async fn citation_without_matching_verse_falls_back_to_retrieval() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(tmp.path(), None);

    let response = engine.search(request("bg 2.40")).await;
    let outcome = response.outcome().expect("success");
    assert!(outcome.results.iter().all(|r| !r.is_exact));
    assert!(!outcome.results.is_empty());
}

#[tokio::test]
async fn exact_phrase_is_found_by_every_source() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(tmp.path(), None);

    let mut req = request("knowledge burns all karma");
    req.expand_query = false;
    let response = engine.search(req).await;
    let outcome = response.outcome().expect("success");

    let top = &outcome.results[0];
    assert_eq!(top.chapter(), "4");
    assert_eq!(top.per_source_ranks.substring, Some(0));
    assert_eq!(top.per_source_ranks.bm25, Some(0));
    assert_eq!(top.per_source_ranks.vector, Some(0));
    assert!(outcome.results.windows(2).all(|w| w[0].fusion_score >= w[1].fusion_score));
    assert!(outcome.count <= 5);
}

#[tokio::test]
async fn expansion_adds_variants() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(tmp.path(), None);

    let response = engine.search(request("eternal soul")).await;
    let outcome = response.outcome().expect("success");
    assert_eq!(outcome.query_variants[0], "eternal soul");
    assert!(outcome.query_variants.len() > 1);
    assert!(outcome.results.iter().any(|r| r.text.contains("soul")));
}

#[tokio::test]
async fn failing_scorer_returns_fused_order() {
    let tmp = TempDir::new().unwrap();
    let plain = engine(tmp.path(), None);
    let degraded = engine(tmp.path(), Some(Arc::new(DownScorer)));

    let mut req = request("soul body");
    req.expand_query = false;
    let mut unreranked = req.clone();
    unreranked.use_reranking = false;

    let expected = plain.search(unreranked).await;
    let actual = degraded.search(req).await;
    let expected = expected.outcome().expect("success");
    let actual = actual.outcome().expect("degraded search still succeeds");

    let order = |o: &shukabase_hybrid::SearchOutcome| o.results.iter().map(|r| r.chunk_ref.clone()).collect::<Vec<_>>();
    assert_eq!(order(actual), order(expected));
    assert!(actual.results.iter().all(|r| r.final_score.is_none()));
}

#[tokio::test]
async fn scorer_reorders_results() {
    let tmp = TempDir::new().unwrap();
    let scorer = Arc::new(ArjunaScorer::default());
    let engine = engine(tmp.path(), Some(scorer.clone()));

    let mut req = request("soul");
    req.top_k = 5;
    let response = engine.search(req).await;
    let outcome = response.outcome().expect("success");

    assert_eq!(scorer.calls.load(Ordering::SeqCst), 1);
    if outcome.results.iter().any(|r| r.text.contains("Arjuna")) {
        assert!(outcome.results[0].text.contains("Arjuna"));
    }
    assert!(outcome.results.iter().all(|r| r.final_score.is_some()));
}

#[tokio::test]
async fn input_errors_become_failure_responses() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(tmp.path(), None);

    let empty = engine.search(request("   ")).await;
    assert!(!empty.is_success());
    assert_eq!(empty.error(), Some(Error::EmptyQuery.to_string().as_str()));

    let mut german = request("seele");
    german.language = "de".into();
    let unsupported = engine.search(german).await;
    assert!(unsupported.error().is_some_and(|e| e.contains("Unsupported language")));

    let unloaded = engine.search(SearchRequest::new("душа", Language::Ru)).await;
    assert!(unloaded.error().is_some_and(|e| e.contains("not loaded")));

    let json = serde_json::to_value(&unloaded).unwrap();
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn top_k_zero_still_returns_one() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(tmp.path(), None);
    let mut req = request("soul");
    req.top_k = 0;
    let response = engine.search(req).await;
    assert_eq!(response.outcome().expect("success").count, 1);
}

#[tokio::test]
async fn huge_top_k_is_served_from_the_partition() {
    let tmp = TempDir::new().unwrap();
    for scorer in [None, Some(Arc::new(ArjunaScorer::default()) as Arc<dyn CrossEncoder>)] {
        let engine = engine(tmp.path(), scorer);
        let mut req = request("soul");
        req.top_k = usize::MAX;
        let response = engine.search(req).await;
        let outcome = response.outcome().expect("success");
        assert!(outcome.count >= 1);
        assert!(outcome.count <= 5, "never more than the chunks in the partition");
    }
}

/// Blocks far past any reasonable search deadline.
struct StalledEmbedder;

impl Embedder for StalledEmbedder {
    fn dim(&self) -> usize { DIM }
    fn embed(&self, texts: &[String], mode: EmbedMode) -> anyhow::Result<Vec<Vec<f32>>> {
        std::thread::sleep(Duration::from_millis(1500));
        HashEmbedder::new(DIM).embed(texts, mode)
    }
}

#[tokio::test]
async fn slow_embedding_yields_keyword_results_within_deadline() {
    let tmp = TempDir::new().unwrap();
    let store = english_store();
    let corpus = corpus_for(Language::En, &store);
    let rows = vectors(&corpus);
    let index = FlatIndex::new(DIM, &rows).expect("index");
    let bundle = LanguageBundle::from_parts(corpus, Arc::new(StalledEmbedder), Arc::new(index), rows.len(), &tmp.path().join("en"))
        .expect("bundle");
    let engine = SearchEngine::new(vec![bundle], None, Settings::default().search);

    let mut req = request("soul");
    req.expand_query = false;
    req.deadline_ms = Some(200);
    let started = Instant::now();
    let response = engine.search(req).await;
    let elapsed = started.elapsed();

    let outcome = response.outcome().expect("keyword sources still answer");
    assert!(elapsed < Duration::from_millis(1000), "search took {elapsed:?}");
    assert!(outcome.count > 0);
    assert!(outcome.results.iter().all(|r| r.per_source_ranks.vector.is_none()));
    assert!(outcome.results.iter().any(|r| r.per_source_ranks.bm25.is_some() || r.per_source_ranks.substring.is_some()));
}

#[test]
fn mismatched_indexes_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let store = english_store();
    let corpus = corpus_for(Language::En, &store);
    let rows = vectors(&corpus);

    let index = FlatIndex::new(DIM, &rows).unwrap();
    let narrow = Arc::new(HashEmbedder::new(DIM / 2));
    let err = LanguageBundle::from_parts(corpus.clone(), narrow, Arc::new(index), rows.len(), tmp.path()).err().unwrap();
    assert!(matches!(err, Error::DimensionMismatch { expected: DIM, actual } if actual == DIM / 2));

    let short = FlatIndex::new(DIM, &rows[..rows.len() - 1]).unwrap();
    let err = LanguageBundle::from_parts(corpus, Arc::new(HashEmbedder::new(DIM)), Arc::new(short), rows.len() - 1, tmp.path())
        .err()
        .unwrap();
    assert!(matches!(err, Error::RowCountMismatch { .. }));
}

#[tokio::test]
async fn load_serves_the_languages_that_load() {
    let tmp = TempDir::new().unwrap();
    let corpus_dir = tmp.path().join("rag");
    let store = english_store();
    write_json(&chunks_file(&corpus_dir, Language::En), &store).unwrap();
    let metadata = MetadataFile::from_store(&store, None, Some(DIM));
    write_json(&metadata_file(&corpus_dir, Language::En), &metadata).unwrap();
    let corpus = Corpus::load(&corpus_dir, Language::En).unwrap();
    FlatIndex::new(DIM, &vectors(&corpus))
        .unwrap()
        .save(&shukabase_core::corpus::vectors_file(&corpus_dir, Language::En))
        .unwrap();

    // Russian files are absent: that partition is skipped, English serves.
    let settings = Settings::default();
    let engine = SearchEngine::load(&settings, tmp.path(), Arc::new(HashEmbedder::new(DIM))).await.expect("load");
    assert_eq!(engine.loaded_languages(), vec![Language::En]);
    assert!(tmp.path().join("rag/indexes/en/lexical").exists());

    let response = engine.search(request("bg 2.20")).await;
    let outcome = response.outcome().expect("success");
    assert_eq!(outcome.count, 1);
    assert_eq!(outcome.results[0].chunk_ref.chunk_index, 2);
}

#[tokio::test]
async fn load_fails_when_nothing_loads() {
    let tmp = TempDir::new().unwrap();
    let result = SearchEngine::load(&Settings::default(), tmp.path(), Arc::new(HashEmbedder::new(DIM))).await;
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}
