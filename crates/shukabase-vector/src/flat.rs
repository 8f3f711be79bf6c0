use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::fs;
use std::io::Write;
use std::path::Path;

use shukabase_core::traits::VectorIndex;

const MAGIC: &[u8; 8] = b"SKBVEC01";
const HEADER_LEN: usize = 8 + 8 + 8;

/// Exhaustive squared-L2 index over a row-major `f32` matrix.
#[derive(Debug)]
pub struct FlatIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dim: usize, rows: &[Vec<f32>]) -> Result<Self> {
        if dim == 0 { bail!("vector dimension must be positive"); }
        let mut data = Vec::with_capacity(rows.len() * dim);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != dim { bail!("row {} has {} dims, expected {}", i, row.len(), dim); }
            data.extend_from_slice(row);
        }
        Ok(Self { dim, data })
    }

    pub fn rows(&self) -> usize { self.data.len() / self.dim }

    /// Layout: magic, rows (u64 LE), dim (u64 LE), then `rows * dim` f32 LE.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() { fs::create_dir_all(parent)?; }
        let tmp = path.with_extension("f32.tmp");
        let mut out = fs::File::create(&tmp)?;
        let mut buf = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&(self.rows() as u64).to_le_bytes());
        buf.extend_from_slice(&(self.dim as u64).to_le_bytes());
        for x in &self.data { buf.extend_from_slice(&x.to_le_bytes()); }
        out.write_all(&buf)?;
        out.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| anyhow!("{}: {}", path.display(), e))?;
        if bytes.len() < HEADER_LEN || &bytes[..8] != MAGIC { bail!("{} is not a vector index file", path.display()); }
        let rows = u64::from_le_bytes(bytes[8..16].try_into()?) as usize;
        let dim = u64::from_le_bytes(bytes[16..24].try_into()?) as usize;
        let body = &bytes[HEADER_LEN..];
        let Some(expected) = rows.checked_mul(dim).and_then(|n| n.checked_mul(4)) else {
            bail!("{} has an impossible header: {}x{}", path.display(), rows, dim);
        };
        if dim == 0 || body.len() != expected {
            bail!("{} is truncated: header says {}x{}, body has {} bytes", path.display(), rows, dim, body.len());
        }
        let data = body.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])).collect();
        tracing::info!(file = %path.display(), rows, dim, "loaded flat vector index");
        Ok(Self { dim, data })
    }

    fn nearest(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(row, v)| (row, v.iter().zip(query).map(|(a, b)| (a - b) * (a - b)).sum::<f32>()))
            .filter(|(_, d)| d.is_finite())
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }
}

#[async_trait]
impl VectorIndex for FlatIndex {
    fn dim(&self) -> usize { self.dim }

    async fn row_count(&self) -> Result<usize> { Ok(self.rows()) }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dim { bail!("query has {} dims, index has {}", query.len(), self.dim); }
        Ok(self.nearest(query, k))
    }
}
