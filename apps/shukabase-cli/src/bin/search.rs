use std::env;
use std::path::Path;

use shukabase_core::config::Config;
use shukabase_core::Language;
use shukabase_embed::get_default_embedder;
use shukabase_hybrid::{SearchEngine, SearchRequest, SearchResponse};

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} <query> [--lang ru|en] [--top-k N] [--no-rerank] [--no-expand] [--threshold D] [--json]", program);
    eprintln!("Example: {} 'Бхагавад гита 2.13'", program);
    std::process::exit(1);
}

/// Cyrillic letters mean Russian; anything else searches English.
fn detect_language(query: &str) -> Language {
    if query.chars().any(|c| matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё')) { Language::Ru } else { Language::En }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shukabase_core::logging::init();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let mut settings = config.settings()?;
    let args: Vec<String> = env::args().collect();
    let program = args.first().cloned().unwrap_or_else(|| "shukabase-search".to_string());

    let mut query = None; let mut language = None; let mut top_k = settings.search.top_k;
    let mut use_reranking = true; let mut expand_query = true; let mut threshold = None; let mut json = false;
    let mut i = 1; while i < args.len() { match args[i].as_str() {
        "--lang" | "-l" => { i += 1; language = Some(args.get(i).unwrap_or_else(|| usage(&program)).parse::<Language>()?); }
        "--top-k" | "-k" => { i += 1; top_k = args.get(i).and_then(|v| v.parse().ok()).unwrap_or_else(|| usage(&program)); }
        "--threshold" => { i += 1; threshold = Some(args.get(i).and_then(|v| v.parse::<f32>().ok()).unwrap_or_else(|| usage(&program))); }
        "--no-rerank" => use_reranking = false,
        "--no-expand" => expand_query = false,
        "--json" => json = true,
        other if !other.starts_with('-') && query.is_none() => query = Some(other.to_string()),
        _ => usage(&program),
    } i += 1; }
    let Some(query) = query else { usage(&program) };
    let language = language.unwrap_or_else(|| detect_language(&query));

    // Only the requested partition is needed.
    settings.corpus.languages = vec![language.code().to_string()];
    let embedder = get_default_embedder(&settings.embedding)?;
    let engine = SearchEngine::load(&settings, Path::new("."), embedder).await?;

    let mut request = SearchRequest::new(query.clone(), language);
    request.top_k = top_k;
    request.use_reranking = use_reranking;
    request.expand_query = expand_query;
    request.distance_threshold = threshold;
    let response = engine.search(request).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    match response {
        SearchResponse::Ok(outcome) => {
            println!("🔍 \"{}\" ({})", query, language);
            println!("   variants: {}", outcome.query_variants.join(" | "));
            println!("   {} results", outcome.count);
            for (n, r) in outcome.results.iter().enumerate() {
                let score = r.final_score.map(|s| format!("{:.4}", s)).unwrap_or_else(|| "-".to_string());
                let exact = if r.is_exact { "  [exact]" } else { "" };
                println!("\n  {}. {} {} #{}  fusion={:.4}  final={}{}", n + 1, r.book(), r.chapter(), r.chunk_ref.chunk_index, r.fusion_score, score, exact);
                let preview: String = r.text.chars().take(300).collect();
                println!("     📝 {}", preview.replace('\n', " "));
            }
            Ok(())
        }
        SearchResponse::Err(failure) => {
            eprintln!("❌ {}", failure.error);
            std::process::exit(2);
        }
    }
}
