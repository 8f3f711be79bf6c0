//! LanceDB-backed vector index.
//!
//! One table per language; each row carries its metadata row number and the
//! embedding. Search uses L2 so distances line up with `FlatIndex`.
use anyhow::{anyhow, Result};
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator};
use async_trait::async_trait;
use futures::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use std::path::Path;
use std::sync::Arc;

use shukabase_core::traits::VectorIndex;

use crate::schema::{build_vector_schema, DISTANCE_COLUMN, ROW_COLUMN};

const INSERT_BATCH: usize = 1000;

pub struct LanceIndex {
	table: Table,
	dim: usize,
}

impl LanceIndex {
	pub async fn open(uri: &Path, table_name: &str) -> Result<Self> {
		let db = open_db(uri).await?;
		let table = db.open_table(table_name).execute().await?;
		let dim = vector_dim(&table).await?;
		tracing::info!(uri = %uri.display(), table = table_name, dim, "opened lance vector table");
		Ok(Self { table, dim })
	}

	/// Replace the local table `table_name` with `vectors`; row numbers follow slice order.
	pub async fn write(uri: &Path, table_name: &str, vectors: &[Vec<f32>]) -> Result<Self> {
		let dim = vectors.first().map(Vec::len).ok_or_else(|| anyhow!("no vectors to write"))?;
		if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dim) {
			return Err(anyhow!("vector {} has {} dims, expected {}", i, v.len(), dim));
		}
		let table_dir = uri.join(format!("{table_name}.lance"));
		if table_dir.exists() { std::fs::remove_dir_all(&table_dir)?; }
		let db = open_db(uri).await?;

		let pb = ProgressBar::new(vectors.len() as u64);
		pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} rows ({percent}%)")?.progress_chars("#>-"));
		let mut table: Option<Table> = None;
		for (batch_no, chunk) in vectors.chunks(INSERT_BATCH).enumerate() {
			let first_row = batch_no * INSERT_BATCH;
			let batch = to_record_batch(first_row, chunk, dim)?;
			let schema = batch.schema();
			let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
			match &table {
				Some(t) => { t.add(reader).execute().await?; }
				None => { table = Some(db.create_table(table_name, reader).execute().await?); }
			}
			pb.inc(chunk.len() as u64);
		}
		pb.finish_and_clear();
		let table = table.ok_or_else(|| anyhow!("no vectors to write"))?;
		tracing::info!(table = table_name, rows = vectors.len(), dim, "wrote lance vector table");
		Ok(Self { table, dim })
	}
}

#[async_trait]
impl VectorIndex for LanceIndex {
	fn dim(&self) -> usize { self.dim }

	async fn row_count(&self) -> Result<usize> { Ok(self.table.count_rows(None).await?) }

	async fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
		if query.len() != self.dim { return Err(anyhow!("query has {} dims, index has {}", query.len(), self.dim)); }
		let mut stream = self.table.vector_search(query.to_vec())?.distance_type(DistanceType::L2).limit(k).execute().await?;
		let mut hits = Vec::new();
		while let Some(batch) = TryStreamExt::try_next(&mut stream).await? {
			let rows = batch.column_by_name(ROW_COLUMN).and_then(|c| c.as_any().downcast_ref::<Int32Array>()).ok_or_else(|| anyhow!("row column missing"))?;
			let distances = batch.column_by_name(DISTANCE_COLUMN).and_then(|c| c.as_any().downcast_ref::<Float32Array>()).ok_or_else(|| anyhow!("_distance column missing"))?;
			for i in 0..batch.num_rows() {
				// Negative rows mark padding.
				let Ok(row) = usize::try_from(rows.value(i)) else { continue };
				hits.push((row, distances.value(i)));
			}
		}
		hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
		hits.truncate(k);
		Ok(hits)
	}
}

pub async fn open_db(uri: &Path) -> Result<Connection> {
	Ok(connect(uri.to_string_lossy().as_ref()).execute().await?)
}

async fn vector_dim(table: &Table) -> Result<usize> {
	let schema = table.schema().await?;
	let field = schema.field_with_name(crate::schema::VECTOR_COLUMN)?;
	match field.data_type() {
		arrow_schema::DataType::FixedSizeList(_, n) => Ok(usize::try_from(*n)?),
		other => Err(anyhow!("vector column has type {:?}", other)),
	}
}

fn to_record_batch(first_row: usize, vectors: &[Vec<f32>], dim: usize) -> Result<RecordBatch> {
	let dim_i32 = i32::try_from(dim)?;
	let rows: Vec<i32> = (0..vectors.len()).map(|i| i32::try_from(first_row + i)).collect::<Result<_, _>>()?;
	let values = vectors.iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
	let batch = RecordBatch::try_new(build_vector_schema(dim_i32), vec![
		Arc::new(Int32Array::from(rows)),
		Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(values, dim_i32)),
	])?;
	Ok(batch)
}
