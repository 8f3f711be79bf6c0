use std::sync::Arc;

use shukabase_core::corpus::Corpus;
use shukabase_core::traits::Retriever;
use shukabase_core::{Candidate, SourceKind};

/// Literal, case-insensitive phrase matching by occurrence count.
pub struct SubstringRetriever {
	corpus: Arc<Corpus>,
	lowered: Vec<String>,
}

impl SubstringRetriever {
	pub fn new(corpus: Arc<Corpus>) -> Self {
		let lowered = corpus.chunks().iter().map(|c| c.text.to_lowercase()).collect();
		Self { corpus, lowered }
	}

	pub fn search(&self, query: &str, limit: usize) -> Vec<Candidate> {
		let needle = query.trim().to_lowercase();
		if needle.is_empty() || limit == 0 { return vec![]; }

		let mut counts: Vec<(usize, usize)> = self
			.lowered
			.iter()
			.enumerate()
			.filter_map(|(i, text)| {
				let n = text.matches(needle.as_str()).count();
				(n > 0).then_some((i, n))
			})
			.collect();
		// Stable: equal counts keep corpus order.
		counts.sort_by(|a, b| b.1.cmp(&a.1));
		counts.truncate(limit);

		let chunks = self.corpus.chunks();
		counts
			.into_iter()
			.enumerate()
			.map(|(rank, (i, n))| Candidate {
				chunk_ref: chunks[i].chunk_ref(),
				text: chunks[i].text.clone(),
				raw_score: n as f32,
				distance: None,
				source: SourceKind::Substring,
				rank,
				is_exact: false,
			})
			.collect()
	}
}

impl Retriever for SubstringRetriever {
	fn retrieve(&self, query: &str, limit: usize) -> anyhow::Result<Vec<Candidate>> {
		Ok(self.search(query, limit))
	}
}
