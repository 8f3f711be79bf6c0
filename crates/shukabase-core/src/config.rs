//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys use a double underscore, e.g. `APP_SEARCH__TOP_K=10`).
//! `Settings` is the typed view with defaults for every key.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunker::ChunkingConfig;
use crate::types::Language;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_in(Path::new("."))
    }

    /// Load with `config*.toml` looked up in `dir`.
    pub fn load_in(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        match env {
            "prod" | "production" => {
                if env::var("APP_USE_FAKE_EMBEDDINGS").map(|v| v == "1").unwrap_or(false) {
                    anyhow::bail!("APP_USE_FAKE_EMBEDDINGS is not allowed in production");
                }
            }
            "dev" | "development" | "test" | "testing" => {}
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub corpus: CorpusSettings,
    pub chunking: ChunkingConfig,
    pub search: SearchSettings,
    pub embedding: EmbeddingSettings,
    pub reranker: RerankerSettings,
}

impl Settings {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be positive");
        }
        if self.search.top_k == 0 {
            anyhow::bail!("search.top_k must be positive");
        }
        if self.search.vector_concurrency == 0 {
            anyhow::bail!("search.vector_concurrency must be positive");
        }
        for code in &self.corpus.languages {
            code.parse::<Language>().map_err(|e| anyhow::anyhow!("corpus.languages: {}", e))?;
        }
        Ok(())
    }

    /// Configured languages; unknown codes were rejected by `validate`.
    pub fn languages(&self) -> Vec<Language> {
        self.corpus.languages.iter().filter_map(|code| code.parse().ok()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    #[default]
    Flat,
    Lance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusSettings {
    /// Directory holding `chunked_scriptures_<lang>.json` and friends.
    pub dir: String,
    /// Directory for derived indexes (lexical, lance tables).
    pub index_dir: String,
    pub languages: Vec<String>,
    pub vector_backend: VectorBackend,
}

impl Default for CorpusSettings {
    fn default() -> Self {
        Self {
            dir: "rag".to_string(),
            index_dir: "rag/indexes".to_string(),
            languages: vec!["ru".to_string(), "en".to_string()],
            vector_backend: VectorBackend::Flat,
        }
    }
}

impl CorpusSettings {
    pub fn corpus_dir(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.dir)
    }

    pub fn index_dir(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.index_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub top_k: usize,
    pub deadline_ms: u64,
    pub vector_concurrency: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { top_k: 5, deadline_ms: 10_000, vector_concurrency: 4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_dir: Option<String>,
    pub dim: usize,
    pub max_len: usize,
    pub batch_size: usize,
    /// `cls` or `mean`; unset reads the model's own pooling config.
    pub pooling: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { model_dir: None, dim: 1024, max_len: 512, batch_size: 16, pooling: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerSettings {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: u64,
    /// Name of the env var carrying the bearer token, if the service needs one.
    pub api_key_env: Option<String>,
}

impl Default for RerankerSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            model: None,
            timeout_secs: 10,
            api_key_env: None,
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
