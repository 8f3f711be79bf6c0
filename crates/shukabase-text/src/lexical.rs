use anyhow::Result;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::tokenizer::TokenStream;
use tantivy::{doc, Index, IndexReader, ReloadPolicy, TantivyDocument, Term};

use shukabase_core::corpus::Corpus;
use shukabase_core::traits::Retriever;
use shukabase_core::{Candidate, ChunkRef, SourceKind};

use crate::tantivy_utils::{build_schema, register_tokenizer, BOOK_FIELD, CHAPTER_FIELD, CHUNK_INDEX_FIELD, ORDINAL_FIELD, TEXT_FIELD};

/// Written next to the index after a successful build.
const FINGERPRINT_FILE: &str = "corpus.fingerprint";
const WRITER_HEAP_BYTES: usize = 50_000_000;

#[derive(Clone, Copy)]
struct Fields {
	ordinal: Field,
	book: Field,
	chapter: Field,
	chunk_index: Field,
	text: Field,
}

impl Fields {
	fn from_index(index: &Index) -> Result<Self> {
		let schema = index.schema();
		Ok(Self {
			ordinal: schema.get_field(ORDINAL_FIELD)?,
			book: schema.get_field(BOOK_FIELD)?,
			chapter: schema.get_field(CHAPTER_FIELD)?,
			chunk_index: schema.get_field(CHUNK_INDEX_FIELD)?,
			text: schema.get_field(TEXT_FIELD)?,
		})
	}
}

/// BM25 index over one corpus, persisted under its own directory.
pub struct LexicalIndex {
	index: Index,
	reader: IndexReader,
	fields: Fields,
	corpus: Arc<Corpus>,
}

impl LexicalIndex {
	/// Open the persisted index when it matches `corpus`, otherwise rebuild it.
	pub fn open_or_build(index_dir: &Path, corpus: Arc<Corpus>) -> Result<Self> {
		match Self::open(index_dir, corpus.clone()) {
			Ok(Some(index)) => {
				tracing::info!(language = %corpus.language(), dir = %index_dir.display(), "opened lexical index");
				Ok(index)
			}
			Ok(None) => {
				tracing::info!(language = %corpus.language(), dir = %index_dir.display(), "lexical index missing or stale; rebuilding");
				Self::build(index_dir, corpus)
			}
			Err(e) => {
				tracing::warn!(language = %corpus.language(), error = %e, "lexical index unreadable; rebuilding");
				Self::build(index_dir, corpus)
			}
		}
	}

	/// `Ok(None)` when there is nothing usable on disk for this corpus.
	pub fn open(index_dir: &Path, corpus: Arc<Corpus>) -> Result<Option<Self>> {
		let stored = match fs::read_to_string(fingerprint_path(index_dir)) {
			Ok(s) => s,
			Err(_) => return Ok(None),
		};
		if stored.trim() != corpus.fingerprint() { return Ok(None); }
		let index = Index::open_in_dir(index_dir)?;
		register_tokenizer(&index, corpus.language());
		let fields = Fields::from_index(&index)?;
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		let this = Self { index, reader, fields, corpus };
		if this.num_docs() != this.corpus.len() as u64 { return Ok(None); }
		Ok(Some(this))
	}

	pub fn build(index_dir: &Path, corpus: Arc<Corpus>) -> Result<Self> {
		let language = corpus.language();
		if index_dir.exists() { fs::remove_dir_all(index_dir)?; }
		fs::create_dir_all(index_dir)?;
		let index = Index::create_in_dir(index_dir, build_schema(language))?;
		register_tokenizer(&index, language);
		let fields = Fields::from_index(&index)?;

		let mut index_writer = index.writer(WRITER_HEAP_BYTES)?;
		for (ordinal, chunk) in corpus.chunks().iter().enumerate() {
			index_writer.add_document(doc!(
				fields.ordinal => ordinal as u64,
				fields.book => chunk.book.clone(),
				fields.chapter => chunk.chapter.clone(),
				fields.chunk_index => chunk.chunk_index as u64,
				fields.text => chunk.text.clone(),
			))?;
		}
		index_writer.commit()?;
		fs::write(fingerprint_path(index_dir), corpus.fingerprint())?;
		tracing::info!(language = %language, docs = corpus.len(), "built lexical index");

		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		Ok(Self { index, reader, fields, corpus })
	}

	pub fn num_docs(&self) -> u64 { self.reader.searcher().num_docs() }

	/// Analyzed, de-duplicated query terms.
	fn query_terms(&self, query: &str) -> Result<Vec<String>> {
		let mut analyzer = self.index.tokenizer_for_field(self.fields.text)?;
		let mut stream = analyzer.token_stream(query);
		let mut seen = HashSet::new();
		let mut terms = Vec::new();
		while stream.advance() {
			let text = stream.token().text.clone();
			if seen.insert(text.clone()) { terms.push(text); }
		}
		Ok(terms)
	}

	pub fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>> {
		let terms = self.query_terms(query)?;
		let limit = limit.min(self.corpus.len());
		if terms.is_empty() || limit == 0 { return Ok(vec![]); }
		let clauses: Vec<(Occur, Box<dyn Query>)> = terms
			.iter()
			.map(|t| {
				let term = Term::from_field_text(self.fields.text, t);
				(Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)) as Box<dyn Query>)
			})
			.collect();
		let query = BooleanQuery::new(clauses);

		let searcher = self.reader.searcher();
		let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;
		let mut hits = Vec::new();
		for (score, addr) in top_docs {
			if score <= 0.0 { continue; }
			let doc: TantivyDocument = searcher.doc(addr)?;
			let Some(chunk_ref) = self.stored_ref(&doc) else { continue };
			// Drop documents that no longer resolve to a loaded chunk.
			let Some(chunk) = self.corpus.get(&chunk_ref) else { continue };
			let ordinal = doc.get_first(self.fields.ordinal).and_then(|v| v.as_u64());
			if ordinal != self.corpus.position(&chunk_ref).map(|p| p as u64) { continue; }
			hits.push(Candidate {
				chunk_ref,
				text: chunk.text.clone(),
				raw_score: score,
				distance: None,
				source: SourceKind::Bm25,
				rank: hits.len(),
				is_exact: false,
			});
		}
		Ok(hits)
	}

	fn stored_ref(&self, doc: &TantivyDocument) -> Option<ChunkRef> {
		let book = doc.get_first(self.fields.book).and_then(|v| v.as_str())?;
		let chapter = doc.get_first(self.fields.chapter).and_then(|v| v.as_str())?;
		let chunk_index = doc.get_first(self.fields.chunk_index).and_then(|v| v.as_u64())?;
		Some(ChunkRef::new(book, chapter, chunk_index as usize))
	}
}

impl Retriever for LexicalIndex {
	fn retrieve(&self, query: &str, limit: usize) -> anyhow::Result<Vec<Candidate>> {
		self.search(query, limit)
	}
}

fn fingerprint_path(index_dir: &Path) -> PathBuf { index_dir.join(FINGERPRINT_FILE) }
