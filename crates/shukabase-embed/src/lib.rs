//! shukabase-embed
//!
//! Embedding providers: a local BGE-M3 model on Candle and a deterministic
//! hash embedder selected with `APP_USE_FAKE_EMBEDDINGS=1`.
pub mod device;
pub mod hash;
pub mod model;
pub mod pool;
pub mod tokenize;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use shukabase_core::config::{expand_path, EmbeddingSettings};
use shukabase_core::traits::Embedder;

pub use hash::HashEmbedder;
pub use model::{resolve_model_dir, BgeM3Embedder};
pub use pool::{cls_l2, masked_mean_l2, Pooling};

pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if use_fake_embeddings() {
        tracing::info!(dim = settings.dim, "using hash embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.dim)));
    }
    let configured = settings.model_dir.as_deref().map(expand_path);
    let model_dir = resolve_model_dir(configured.as_deref())?;
    let pooling = settings.pooling.as_deref().map(Pooling::parse).transpose()?;
    let model = BgeM3Embedder::load(Path::new(&model_dir), settings.max_len, pooling)?;
    if model.dim() != settings.dim {
        tracing::warn!(configured = settings.dim, model = model.dim(), "embedding.dim differs from the model; using the model's width");
    }
    Ok(Arc::new(model))
}
