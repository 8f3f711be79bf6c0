use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use shukabase_core::chunker::Chunker;
use shukabase_core::config::Config;
use shukabase_core::corpus::{chunks_file, read_json, write_json};
use shukabase_core::Language;

fn main() -> anyhow::Result<()> {
    shukabase_core::logging::init();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <parsed.json | txt_dir> <ru|en>", args[0]);
        eprintln!("Example: {} rag/parsed_scriptures_ru.json ru", args[0]);
        std::process::exit(1);
    }
    let input = PathBuf::from(&args[1]);
    let language: Language = args[2].parse()?;

    let chunker = Chunker::new(settings.chunking.clone());
    println!("shukabase-chunk\n===============");
    println!("Input: {}  language: {}  chunk_size: {}  overlap: {}", input.display(), language, chunker.config().chunk_size, chunker.config().overlap);

    let (store, total) = if input.is_dir() {
        chunker.chunk_directory(&input)?
    } else {
        let parsed: BTreeMap<String, BTreeMap<String, String>> = read_json(&input)?;
        chunker.chunk_parsed(&parsed)
    };
    if total == 0 {
        anyhow::bail!("no chunks produced from {}", input.display());
    }

    let out = chunks_file(&settings.corpus.corpus_dir(Path::new(".")), language);
    write_json(&out, &store)?;
    println!("\n✅ {} chunks from {} books written to {}", total, store.len(), out.display());
    println!("💡 Next: cargo run --bin shukabase-index {}", language);
    Ok(())
}
