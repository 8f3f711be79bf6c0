use shukabase_core::config::EmbeddingSettings;
use shukabase_core::traits::{EmbedMode, Embedder};
use shukabase_embed::{get_default_embedder, HashEmbedder};

fn cosine(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

#[test]
fn fake_embedder_shapes_and_determinism() {
    // Force fake embedder to avoid loading large model
    std::env::set_var("APP_USE_FAKE_EMBEDDINGS", "1");

    let embedder = get_default_embedder(&EmbeddingSettings::default()).expect("embedder");
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed(&texts, EmbedMode::Document).expect("embed");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 1024, "embedding dim follows settings");
    assert_eq!(embedder.dim(), 1024);

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn hash_embedder_query_and_document_agree() {
    let e = HashEmbedder::new(64);
    let q = e.embed(&["Soul, eternal!".to_string()], EmbedMode::Query).unwrap();
    let d = e.embed(&["soul eternal".to_string()], EmbedMode::Document).unwrap();
    assert!((cosine(&q[0], &d[0]) - 1.0).abs() < 1e-5, "punctuation and case are ignored");
}

#[test]
fn hash_embedder_shared_words_are_closer() {
    let e = HashEmbedder::new(256);
    let base = e.embed_one("the soul is eternal");
    let near = e.embed_one("eternal soul");
    let far = e.embed_one("arjuna lifts his bow");
    assert!(cosine(&base, &near) > cosine(&base, &far));
}

#[test]
fn hash_embedder_blank_text_is_zero_vector() {
    let v = HashEmbedder::new(8).embed_one("  ... ");
    assert!(v.iter().all(|x| *x == 0.0));
}
