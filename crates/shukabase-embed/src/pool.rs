use anyhow::{bail, Result};
use candle_core::{DType, IndexOp, Tensor};
use serde_json::Value;

/// How token states collapse into one sentence vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pooling {
    /// First token state; what BGE-M3's dense head uses.
    #[default]
    Cls,
    Mean,
}

impl Pooling {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "cls" => Ok(Pooling::Cls),
            "mean" => Ok(Pooling::Mean),
            other => bail!("unknown pooling '{}'", other),
        }
    }

    /// Read `1_Pooling/config.json` the way sentence-transformers lays it out.
    pub fn from_sentence_transformers(config: &Value) -> Option<Self> {
        if config.get("pooling_mode_cls_token").and_then(Value::as_bool) == Some(true) { return Some(Pooling::Cls); }
        if config.get("pooling_mode_mean_tokens").and_then(Value::as_bool) == Some(true) { return Some(Pooling::Mean); }
        None
    }

    pub fn apply(self, hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        match self {
            Pooling::Cls => cls_l2(hidden),
            Pooling::Mean => masked_mean_l2(hidden, attention_mask),
        }
    }
}

pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (_batch, _time, hidden_dim) = dims3(hidden)?;
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let mask_3d = mask.unsqueeze(2)?;
    let mask_broadcast = mask_3d.broadcast_as(hidden.shape()).or_else(|_| mask_3d.repeat((1, 1, hidden_dim)))?;
    let masked = (hidden * &mask_broadcast)?;
    let sum = masked.sum(1)?;
    let lengths = mask.sum(1)?.unsqueeze(1)?.to_dtype(sum.dtype())?;
    let mean = sum.broadcast_div(&lengths)?;
    l2_rows(&mean)
}

pub fn cls_l2(hidden: &Tensor) -> Result<Tensor> {
    dims3(hidden)?;
    let cls = hidden.i((.., 0, ..))?.contiguous()?;
    l2_rows(&cls)
}

fn l2_rows(rows: &Tensor) -> Result<Tensor> {
    let eps_val = match rows.dtype() { DType::F16 => 1e-6f32, _ => 1e-12f32 };
    let eps = Tensor::new(&[eps_val], rows.device())?.to_dtype(rows.dtype())?.unsqueeze(0)?;
    let norm = rows.sqr()?.sum_keepdim(1)?.sqrt()?;
    let norm = norm.broadcast_add(&eps)?;
    Ok(rows.broadcast_div(&norm)?)
}

fn dims3(hidden: &Tensor) -> Result<(usize, usize, usize)> {
    match hidden.dims() {
        &[b, t, h] => Ok((b, t, h)),
        other => bail!("hidden shape must be [B,T,H], got {:?}", other),
    }
}
