use docrag_core::config::EmbedSettings;
use docrag_core::traits::Embedder;
use docrag_embed::{get_default_embedder, HashEmbedder};

#[test]
fn fake_embedder_shapes_and_determinism() {
    let settings = EmbedSettings { provider: "hash".into(), hash_dim: 1024, ..EmbedSettings::default() };
    let embedder = get_default_embedder(&settings).expect("embedder");
    assert_eq!(embedder.dim(), 1024);
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), embedder.dim(), "embedding dim matches dim()");

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn single_and_batch_embedding_agree() {
    let embedder = HashEmbedder::new(64);
    let texts = vec!["first chunk".to_string(), "second chunk of text".to_string()];
    let batch = embedder.embed_batch(&texts).unwrap();
    assert_eq!(batch.len(), 2);
    for (text, vector) in texts.iter().zip(&batch) {
        assert_eq!(&embedder.embed_one(text).unwrap(), vector);
    }
}

#[test]
fn embedder_id_encodes_dimension() {
    let a = HashEmbedder::new(32);
    let b = HashEmbedder::new(64);
    assert_ne!(a.embedder_id(), b.embedder_id());
    assert!(a.embedder_id().ends_with("d32"));
}

#[test]
fn whitespace_only_text_embeds_to_zero_vector() {
    let v = HashEmbedder::new(16).embed_one("   ").unwrap();
    assert_eq!(v.len(), 16);
    assert!(v.iter().all(|x| *x == 0.0));
}

#[test]
fn unknown_provider_is_rejected() {
    let settings = EmbedSettings { provider: "cloud".into(), ..EmbedSettings::default() };
    assert!(get_default_embedder(&settings).is_err());
}

#[test]
fn zero_width_hash_embedder_cannot_divide_by_zero() {
    let embedder = HashEmbedder::new(0);
    assert_eq!(embedder.dim(), 1);
    let v = embedder.embed_one("tax code article").unwrap();
    assert_eq!(v.len(), 1);
    assert!((v[0] - 1.0).abs() < 1e-6);

    let settings = EmbedSettings { provider: "hash".into(), hash_dim: 0, ..EmbedSettings::default() };
    assert!(get_default_embedder(&settings).is_err());
}

/// Needs the model files on disk:
/// `APP_MODEL_DIR=models/paraphrase-multilingual-mpnet-base-v2 cargo test -p docrag-embed -- --ignored`
#[ignore]
#[test]
fn sentence_embedder_ranks_paraphrase_closer() {
    let settings = EmbedSettings::default();
    let embedder = get_default_embedder(&settings).expect("model");
    let texts = vec![
        "How do I appeal a tax decision?".to_string(),
        "Filing an appeal against the tax authority's ruling".to_string(),
        "The weather is sunny today".to_string(),
    ];
    let v = embedder.embed_batch(&texts).expect("embed");
    let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
    assert!(dot(&v[0], &v[1]) > dot(&v[0], &v[2]));
}
