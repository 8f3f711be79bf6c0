//! Per-language bundles and the search call surface.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};

use shukabase_core::config::{SearchSettings, Settings, VectorBackend};
use shukabase_core::corpus::{vectors_file, Corpus};
use shukabase_core::traits::{CrossEncoder, Embedder, Retriever, VectorIndex};
use shukabase_core::{Candidate, Error, FusedResult, Language, Result};
use shukabase_text::{LexicalIndex, SubstringRetriever};
use shukabase_vector::{FlatIndex, LanceIndex, VectorRetriever};

use crate::cross_encoder::HttpCrossEncoder;
use crate::expand::QueryExpander;
use crate::fusion::fuse;
use crate::reference::ReferenceDetector;
use crate::rerank::RerankDispatcher;

pub fn lexical_dir(index_dir: &Path, language: Language) -> PathBuf {
    index_dir.join(language.code()).join("lexical")
}

pub fn lance_dir(index_dir: &Path) -> PathBuf {
    index_dir.join("lance")
}

pub fn lance_table(language: Language) -> String {
    format!("vectors_{}", language.code())
}

/// Everything one language needs to serve queries. Immutable once built.
pub struct LanguageBundle {
    corpus: Arc<Corpus>,
    vector: VectorRetriever,
    lexical: LexicalIndex,
    substring: SubstringRetriever,
}

impl LanguageBundle {
    /// Load the corpus files and indexes for `language`, checking that the
    /// vector index agrees with the embedder and the metadata.
    pub async fn load(settings: &Settings, base: &Path, language: Language, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let corpus_dir = settings.corpus.corpus_dir(base);
        let index_dir = settings.corpus.index_dir(base);
        let corpus = Arc::new(Corpus::load(&corpus_dir, language)?);

        let index: Arc<dyn VectorIndex> = match settings.corpus.vector_backend {
            VectorBackend::Flat => {
                let path = vectors_file(&corpus_dir, language);
                Arc::new(FlatIndex::load(&path).map_err(|e| Error::Corpus(format!("{}: {e:#}", path.display())))?)
            }
            VectorBackend::Lance => Arc::new(
                LanceIndex::open(&lance_dir(&index_dir), &lance_table(language))
                    .await
                    .map_err(|e| Error::Corpus(format!("lance table {}: {e:#}", lance_table(language))))?,
            ),
        };
        let rows = index.row_count().await.map_err(|e| Error::Operation(format!("{e:#}")))?;

        let lexical_path = lexical_dir(&index_dir, language);
        tokio::task::spawn_blocking(move || Self::from_parts(corpus, embedder, index, rows, &lexical_path))
            .await
            .map_err(|e| Error::Operation(format!("lexical build task: {e}")))?
    }

    /// Assemble a bundle from an already-open vector index holding `rows` rows.
    /// Builds or reopens the lexical index under `lexical_path`.
    pub fn from_parts(
        corpus: Arc<Corpus>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        rows: usize,
        lexical_path: &Path,
    ) -> Result<Self> {
        if index.dim() != embedder.dim() {
            return Err(Error::DimensionMismatch { expected: index.dim(), actual: embedder.dim() });
        }
        if let Some(recorded) = corpus.embedding_dim().filter(|d| *d != index.dim()) {
            return Err(Error::DimensionMismatch { expected: index.dim(), actual: recorded });
        }
        corpus.validate_rows(rows)?;
        let lexical = LexicalIndex::open_or_build(lexical_path, corpus.clone()).map_err(|e| Error::Operation(format!("{e:#}")))?;
        tracing::info!(
            language = %corpus.language(),
            chunks = corpus.len(),
            vectors = rows,
            lexical_docs = lexical.num_docs(),
            "language bundle ready"
        );
        Ok(Self {
            vector: VectorRetriever::new(embedder, index, corpus.clone()),
            substring: SubstringRetriever::new(corpus.clone()),
            lexical,
            corpus,
        })
    }

    pub fn corpus(&self) -> &Arc<Corpus> { &self.corpus }
    pub fn language(&self) -> Language { self.corpus.language() }
}

fn default_language() -> String { Language::Ru.code().to_string() }
fn default_top_k() -> usize { 5 }
fn default_true() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Language code; unknown codes produce a failure response.
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_true")]
    pub use_reranking: bool,
    #[serde(default = "default_true")]
    pub expand_query: bool,
    #[serde(default)]
    pub distance_threshold: Option<f32>,
    /// Overrides `search.deadline_ms` for this call.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, language: Language) -> Self {
        Self {
            query: query.into(),
            language: language.code().to_string(),
            top_k: default_top_k(),
            use_reranking: true,
            expand_query: true,
            distance_threshold: None,
            deadline_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub success: bool,
    pub results: Vec<FusedResult>,
    pub query_variants: Vec<String>,
    pub count: usize,
}

impl SearchOutcome {
    fn new(results: Vec<FusedResult>, query_variants: Vec<String>) -> Self {
        Self { success: true, count: results.len(), results, query_variants }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFailure {
    pub success: bool,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchResponse {
    Ok(SearchOutcome),
    Err(SearchFailure),
}

impl SearchResponse {
    fn failure(error: impl Into<String>) -> Self {
        SearchResponse::Err(SearchFailure { success: false, error: error.into() })
    }

    pub fn is_success(&self) -> bool { matches!(self, SearchResponse::Ok(_)) }

    pub fn outcome(&self) -> Option<&SearchOutcome> {
        match self {
            SearchResponse::Ok(o) => Some(o),
            SearchResponse::Err(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            SearchResponse::Ok(_) => None,
            SearchResponse::Err(f) => Some(&f.error),
        }
    }
}

/// Per-variant lists from one retrieval source; `None` when the source failed
/// for every variant or missed the deadline.
type SourceLists = Option<Vec<Vec<Candidate>>>;

struct KeywordLists {
    lexical: SourceLists,
    substring: SourceLists,
}

pub struct SearchEngine {
    bundles: HashMap<Language, Arc<LanguageBundle>>,
    expander: QueryExpander,
    detector: ReferenceDetector,
    reranker: RerankDispatcher,
    settings: SearchSettings,
}

impl SearchEngine {
    pub fn new(bundles: Vec<LanguageBundle>, scorer: Option<Arc<dyn CrossEncoder>>, settings: SearchSettings) -> Self {
        let bundles = bundles.into_iter().map(|b| (b.language(), Arc::new(b))).collect();
        Self {
            bundles,
            expander: QueryExpander::default(),
            detector: ReferenceDetector::new(),
            reranker: RerankDispatcher::new(scorer),
            settings,
        }
    }

    /// Load every configured language. A language that fails to load is
    /// logged and left out; the call fails only if none load.
    pub async fn load(settings: &Settings, base: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let mut bundles = Vec::new();
        for language in settings.languages() {
            match LanguageBundle::load(settings, base, language, embedder.clone()).await {
                Ok(bundle) => bundles.push(bundle),
                Err(e) => tracing::error!(%language, error = %e, "language partition failed to load"),
            }
        }
        if bundles.is_empty() {
            return Err(Error::InvalidConfig("no language partition could be loaded".to_string()));
        }

        let scorer: Option<Arc<dyn CrossEncoder>> = match HttpCrossEncoder::from_settings(&settings.reranker) {
            Ok(Some(encoder)) => {
                tracing::info!(endpoint = encoder.endpoint(), "reranker enabled");
                Some(Arc::new(encoder))
            }
            Ok(None) => {
                tracing::info!("no reranker configured; results keep fused order");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "reranker disabled");
                None
            }
        };
        Ok(Self::new(bundles, scorer, settings.search.clone()))
    }

    /// Loaded languages in code order.
    pub fn loaded_languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.bundles.keys().copied().collect();
        languages.sort();
        languages
    }

    pub fn bundle(&self, language: Language) -> Option<&Arc<LanguageBundle>> {
        self.bundles.get(&language)
    }

    /// Run one search. Every error, including a panic inside the pipeline,
    /// becomes a failure response.
    pub async fn search(&self, request: SearchRequest) -> SearchResponse {
        match AssertUnwindSafe(self.try_search(&request)).catch_unwind().await {
            Ok(Ok(outcome)) => SearchResponse::Ok(outcome),
            Ok(Err(e)) => {
                tracing::warn!(query = %request.query, error = %e, "search rejected");
                SearchResponse::failure(e.to_string())
            }
            Err(_) => {
                tracing::error!(query = %request.query, "search panicked");
                SearchResponse::failure("internal error during search")
            }
        }
    }

    async fn try_search(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        let query = request.query.trim();
        if query.is_empty() { return Err(Error::EmptyQuery); }
        let language: Language = request.language.parse()?;
        let bundle = self.bundles.get(&language).cloned().ok_or(Error::LanguageNotLoaded(language))?;
        let top_k = request.top_k.max(1);
        let budget = Duration::from_millis(request.deadline_ms.unwrap_or(self.settings.deadline_ms));
        let deadline = Instant::now() + budget;
        tracing::info!(query, %language, top_k, "search");

        if let Some(reference) = self.detector.detect(query) {
            let hits = self.detector.find_verse(&reference, &bundle.corpus);
            if !hits.is_empty() {
                tracing::info!(book = %reference.book_code, chapter = %reference.chapter, verse = reference.verse, hits = hits.len(), "exact verse match");
                let results = hits.into_iter().take(top_k).map(FusedResult::from_exact).collect();
                return Ok(SearchOutcome::new(results, vec![query.to_string()]));
            }
            tracing::debug!(book = %reference.book_code, chapter = %reference.chapter, verse = reference.verse, "cited verse not in corpus");
        }

        let variants = if request.expand_query { self.expander.expand(query, language) } else { vec![query.to_string()] };
        tracing::debug!(?variants, "query variants");

        let rerank = request.use_reranking && self.reranker.is_enabled();
        // No source can return more than the partition holds.
        let pool = if rerank { top_k.saturating_mul(2) } else { top_k };
        let pool = pool.min(bundle.corpus.len().max(1));

        let keyword_task = {
            let bundle = bundle.clone();
            let variants = variants.clone();
            tokio::task::spawn_blocking(move || keyword_lists(&bundle, &variants, pool))
        };
        let keyword = async {
            match timeout_at(deadline, keyword_task).await {
                Ok(Ok(lists)) => lists,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "keyword retrieval task failed");
                    KeywordLists { lexical: None, substring: None }
                }
                Err(_) => {
                    tracing::warn!("keyword retrieval missed the deadline");
                    KeywordLists { lexical: None, substring: None }
                }
            }
        };
        let (vector, keyword) = tokio::join!(
            self.vector_lists(&bundle, &variants, pool, request.distance_threshold, deadline),
            keyword
        );

        if vector.is_none() && keyword.lexical.is_none() && keyword.substring.is_none() {
            return Err(Error::Operation("all retrieval sources failed".to_string()));
        }
        let vector = vector.unwrap_or_default();
        let lexical = keyword.lexical.unwrap_or_default();
        let substring = keyword.substring.unwrap_or_default();
        let fused = fuse(&[], &vector, &lexical, &substring, pool);
        tracing::debug!(fused = fused.len(), "fusion done");

        let results = if rerank {
            let remaining = deadline.saturating_duration_since(Instant::now());
            self.reranker.rerank(query, fused, top_k, Some(remaining)).await
        } else {
            let mut fused = fused;
            fused.truncate(top_k);
            fused
        };
        tracing::info!(count = results.len(), "search done");
        Ok(SearchOutcome::new(results, variants))
    }

    /// Vector retrieval for every variant, at most `vector_concurrency` at a
    /// time. Variants that fail or finish after `deadline` contribute nothing.
    async fn vector_lists(
        &self,
        bundle: &LanguageBundle,
        variants: &[String],
        limit: usize,
        threshold: Option<f32>,
        deadline: Instant,
    ) -> SourceLists {
        let permits = Semaphore::new(self.settings.vector_concurrency.max(1));
        let tasks = variants.iter().map(|variant| {
            let permits = &permits;
            async move {
                let _permit = permits.acquire().await.ok()?;
                match timeout_at(deadline, bundle.vector.retrieve(variant, limit, threshold)).await {
                    Ok(Ok(hits)) => {
                        tracing::debug!(variant = %variant, hits = hits.len(), "vector");
                        Some(hits)
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(variant = %variant, error = %e, "vector retrieval failed");
                        None
                    }
                    Err(_) => {
                        tracing::warn!(variant = %variant, "vector retrieval missed the deadline");
                        None
                    }
                }
            }
        });
        let lists: Vec<Vec<Candidate>> = futures::future::join_all(tasks).await.into_iter().flatten().collect();
        if lists.is_empty() { None } else { Some(lists) }
    }
}

fn keyword_lists(bundle: &LanguageBundle, variants: &[String], limit: usize) -> KeywordLists {
    KeywordLists {
        lexical: variant_lists("bm25", &bundle.lexical, variants, limit),
        substring: variant_lists("substring", &bundle.substring, variants, limit),
    }
}

fn variant_lists(source: &str, retriever: &dyn Retriever, variants: &[String], limit: usize) -> SourceLists {
    let mut lists = Vec::new();
    for variant in variants {
        match retriever.retrieve(variant, limit) {
            Ok(hits) => {
                tracing::debug!(source, variant = %variant, hits = hits.len(), "keyword");
                lists.push(hits);
            }
            Err(e) => tracing::warn!(source, variant = %variant, error = %e, "keyword retrieval failed"),
        }
    }
    if lists.is_empty() { None } else { Some(lists) }
}
