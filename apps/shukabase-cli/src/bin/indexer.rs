use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::path::Path;
use std::sync::Arc;

use shukabase_core::config::Config;
use shukabase_core::corpus::{chunks_file, metadata_file, read_json, vectors_file, write_json, ChunkStore, Corpus, MetadataFile};
use shukabase_core::traits::EmbedMode;
use shukabase_core::Language;
use shukabase_embed::{get_default_embedder, use_fake_embeddings};
use shukabase_hybrid::engine::{lance_dir, lance_table, lexical_dir};
use shukabase_text::LexicalIndex;
use shukabase_vector::{FlatIndex, LanceIndex};

fn main() -> anyhow::Result<()> {
    shukabase_core::logging::init();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;
    let args: Vec<String> = env::args().skip(1).collect();
    let mut language = None; let mut lance = false; let mut skip_lexical = false;
    for arg in &args { match arg.as_str() {
        "--lance" => lance = true,
        "--skip-lexical" | "-s" => skip_lexical = true,
        other if !other.starts_with('-') => language = Some(other.parse::<Language>()?),
        other => { eprintln!("Unknown flag: {}", other); std::process::exit(1); }
    } }
    let Some(language) = language else {
        eprintln!("Usage: shukabase-index <ru|en> [--lance] [--skip-lexical]");
        std::process::exit(1);
    };

    let base = Path::new(".");
    let corpus_dir = settings.corpus.corpus_dir(base);
    let index_dir = settings.corpus.index_dir(base);
    println!("shukabase-index\n===============");
    println!("Language: {}  corpus: {}  indexes: {}", language, corpus_dir.display(), index_dir.display());

    let store: ChunkStore = read_json(&chunks_file(&corpus_dir, language))?;
    let embedder = get_default_embedder(&settings.embedding)?;
    let model = if use_fake_embeddings() { "hash".to_string() } else { settings.embedding.model_dir.clone().unwrap_or_else(|| "bge-m3".to_string()) };
    let metadata = MetadataFile::from_store(&store, Some(model), Some(embedder.dim()));
    let corpus = Arc::new(Corpus::new(language, &store, metadata.flatten()));
    println!("📚 {} chunks, {} vector rows, dim {}", corpus.len(), corpus.metadata().len(), embedder.dim());

    let texts: Vec<String> = corpus.metadata().iter().map(|r| corpus.row_text(r)).collect();
    let pb = ProgressBar::new(texts.len() as u64);
    pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%)")?.progress_chars("#>-"));
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(settings.embedding.batch_size.max(1)) {
        let rows = embedder.embed(batch, EmbedMode::Document)?;
        if rows.len() != batch.len() {
            anyhow::bail!("embedder returned {} rows for a batch of {}", rows.len(), batch.len());
        }
        vectors.extend(rows);
        pb.inc(batch.len() as u64);
    }
    pb.finish_and_clear();

    write_json(&metadata_file(&corpus_dir, language), &metadata)?;
    let flat = FlatIndex::new(embedder.dim(), &vectors)?;
    let flat_path = vectors_file(&corpus_dir, language);
    flat.save(&flat_path)?;
    println!("🔢 Wrote {} vectors to {}", flat.rows(), flat_path.display());

    if lance {
        let uri = lance_dir(&index_dir);
        std::fs::create_dir_all(&uri)?;
        tokio::runtime::Runtime::new()?.block_on(async { LanceIndex::write(&uri, &lance_table(language), &vectors).await })?;
        println!("🗄️  Wrote LanceDB table {} under {}", lance_table(language), uri.display());
    }

    if !skip_lexical {
        let dir = lexical_dir(&index_dir, language);
        let lexical = LexicalIndex::build(&dir, corpus.clone())?;
        println!("📊 Indexed {} chunks into Tantivy at {}", lexical.num_docs(), dir.display());
    } else {
        println!("⚠️  Skipping lexical index (--skip-lexical flag)");
    }

    println!("\n✅ Indexing completed successfully!");
    println!("💡 To search, use: cargo run --bin shukabase-search '<query>' --lang {}", language);
    Ok(())
}
