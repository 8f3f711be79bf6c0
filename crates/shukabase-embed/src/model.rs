use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;

use shukabase_core::traits::{EmbedMode, Embedder};

use crate::device::select_device;
use crate::pool::Pooling;
use crate::tokenize::tokenize_batch_on_device;

/// Local BGE-M3 (XLM-RoBERTa) dense embedder.
pub struct BgeM3Embedder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
    pooling: Pooling,
}

impl BgeM3Embedder {
    pub fn load(model_dir: &Path, max_len: usize, pooling: Option<Pooling>) -> Result<Self> {
        let device = select_device();
        tracing::info!(dir = %model_dir.display(), "loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let raw_config: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let dim = raw_config
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))? as usize;

        let vb = load_weights(model_dir, &device)?;
        let model = XLMRobertaModel::new(&config, vb)?;

        let pooling = match pooling {
            Some(p) => p,
            None => pooling_from_dir(model_dir).unwrap_or_default(),
        };
        tracing::info!(dim, max_len, ?pooling, "embedding model ready");
        Ok(Self { model, tokenizer, device, dim, max_len, pooling })
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_batch_on_device(&self.tokenizer, texts, self.max_len, &self.device)?;
        let token_type_ids = Tensor::zeros(input_ids.shape(), DType::I64, &self.device)?;
        let hidden_states = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = self.pooling.apply(&hidden_states, &attention_mask)?;
        let rows: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        if rows.iter().any(|r| r.len() != self.dim) {
            return Err(anyhow!("model produced vectors of unexpected width (want {})", self.dim));
        }
        tracing::debug!(batch = texts.len(), ms = start.elapsed().as_millis() as u64, "embedded batch");
        Ok(rows)
    }
}

impl Embedder for BgeM3Embedder {
    fn dim(&self) -> usize { self.dim }

    // BGE-M3 dense retrieval embeds queries and passages the same way.
    fn embed(&self, texts: &[String], _mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(vec![]); }
        self.embed_batch(texts)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let dtype = DType::F32;
    let safetensors = model_dir.join("model.safetensors");
    let weights_map: HashMap<String, Tensor> = if safetensors.exists() {
        candle_core::safetensors::load(&safetensors, device)?
    } else {
        let weights_path = model_dir.join("pytorch_model.bin");
        candle_core::pickle::read_all(&weights_path)?.into_iter().collect()
    };
    Ok(VarBuilder::from_tensors(weights_map, dtype, device))
}

fn pooling_from_dir(model_dir: &Path) -> Option<Pooling> {
    let raw = std::fs::read_to_string(model_dir.join("1_Pooling").join("config.json")).ok()?;
    let value: serde_json::Value = serde_json::from_str(&raw).ok()?;
    Pooling::from_sentence_transformers(&value)
}

/// Explicit setting first, then `APP_MODEL_DIR` / `MODEL_DIR`, then the usual locations.
pub fn resolve_model_dir(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = configured { if p.exists() { return Ok(p.to_path_buf()); } }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) { let p = PathBuf::from(&dir); if p.exists() { tracing::info!(var, dir = %p.display(), "using model dir"); return Ok(p); } }
    }
    for candidate in ["models/bge-m3", "../models/bge-m3"] {
        let p = Path::new(candidate); if p.exists() { return Ok(p.to_path_buf()); }
    }
    Err(anyhow!("Could not locate BGE-M3 model directory"))
}
