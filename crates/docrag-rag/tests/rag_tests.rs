use std::sync::Arc;

use tempfile::TempDir;

use docrag_core::corpus::save_corpus;
use docrag_core::{ChunkingConfig, Corpus, Embedder, Error};
use docrag_embed::HashEmbedder;
use docrag_rag::{format_context, IndexingPipeline, Retriever};
use docrag_vector::{Collection, IndexStore};

const DIM: usize = 128;

async fn collection(tmp: &TempDir) -> Collection {
    let store = IndexStore::open(&tmp.path().join("vectordb")).await.unwrap();
    store.open_or_create("docs").await.unwrap()
}

fn pipeline(docs: Collection, embedder: Arc<dyn Embedder>) -> IndexingPipeline {
    IndexingPipeline::new(docs, embedder).with_progress(false)
}

fn corpus(entries: &[(&str, &str)]) -> Corpus {
    entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn tax_corpus() -> Corpus {
    corpus(&[
        ("data/vat.txt", "value added tax rate is eighteen percent of the price"),
        ("data/audit.txt", "auditors review financial statements of companies every year"),
        ("data/customs.txt", "import duties apply to goods crossing the border"),
    ])
}

/// Hash vectors under a different identity.
struct Renamed(HashEmbedder);

impl Embedder for Renamed {
    fn embedder_id(&self) -> &str { "hash:renamed" }
    fn dim(&self) -> usize { self.0.dim() }
    fn max_len(&self) -> usize { self.0.max_len() }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> { self.0.embed_batch(texts) }
}

/// Succeeds for the first `ok_batches` calls, then fails.
struct Flaky {
    inner: HashEmbedder,
    ok_batches: usize,
    calls: std::sync::atomic::AtomicUsize,
}

impl Embedder for Flaky {
    fn embedder_id(&self) -> &str { self.inner.embedder_id() }
    fn dim(&self) -> usize { self.inner.dim() }
    fn max_len(&self) -> usize { self.inner.max_len() }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if call >= self.ok_batches {
            anyhow::bail!("model server went away");
        }
        self.inner.embed_batch(texts)
    }
}

/// Drops the last vector of every batch.
struct Short(HashEmbedder);

impl Embedder for Short {
    fn embedder_id(&self) -> &str { self.0.embedder_id() }
    fn dim(&self) -> usize { self.0.dim() }
    fn max_len(&self) -> usize { self.0.max_len() }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut v = self.0.embed_batch(texts)?;
        v.pop();
        Ok(v)
    }
}

#[tokio::test]
async fn long_document_becomes_three_records() {
    let tmp = TempDir::new().unwrap();
    let docs = collection(&tmp).await;
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(DIM));
    let text = "A".repeat(1200);
    let built = pipeline(docs.clone(), embedder.clone())
        .with_chunking(ChunkingConfig::new(500, 100))
        .build(&corpus(&[("doc1", text.as_str())]))
        .await
        .unwrap();
    assert_eq!(built, 3);
    assert_eq!(docs.count().await.unwrap(), 3);
    assert_eq!(docs.dim().await.unwrap(), Some(DIM));
    assert_eq!(docs.embedder_id().await.unwrap().as_deref(), Some(embedder.embedder_id()));

    let hits = Retriever::new(docs, embedder).retrieve(&"A".repeat(400), 5).await.unwrap();
    assert_eq!(hits.len(), 3);
    let mut ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["chunk_0", "chunk_1", "chunk_2"]);
    assert!(hits.iter().all(|h| h.metadata.total_chunks == 3 && h.metadata.source == "doc1"));
}

#[tokio::test]
async fn count_matches_chunks_produced() {
    let tmp = TempDir::new().unwrap();
    let docs = collection(&tmp).await;
    let chunking = ChunkingConfig::new(20, 5);
    let corpus = tax_corpus();
    let expected: usize = corpus
        .values()
        .map(|t| docrag_core::chunk(t, chunking.chunk_size, chunking.overlap).unwrap().len())
        .sum();
    let built = pipeline(docs.clone(), Arc::new(HashEmbedder::new(DIM)))
        .with_chunking(chunking)
        .with_batch_size(4)
        .build(&corpus)
        .await
        .unwrap();
    assert_eq!(built, expected);
    assert_eq!(docs.count().await.unwrap(), expected);
}

#[tokio::test]
async fn question_retrieves_the_matching_document() {
    let tmp = TempDir::new().unwrap();
    let docs = collection(&tmp).await;
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(DIM));
    pipeline(docs.clone(), embedder.clone()).build(&tax_corpus()).await.unwrap();

    let retriever = Retriever::new(docs, embedder);
    let grounded = retriever.ground("value added tax rate", 2).await.unwrap();
    assert_eq!(grounded.context_used, 2);
    assert_eq!(grounded.sources[0], "vat.txt");
    assert_eq!(grounded.hits[0].metadata.source_path, "data/vat.txt");
    assert!(grounded.hits[0].distance <= grounded.hits[1].distance);
    assert!(grounded.context.starts_with("\n--- Document 1 ---\nSource: vat.txt\nPart: 1/1\n"));
    assert_eq!(grounded.context, format_context(&grounded.hits));

    let json = serde_json::to_value(&grounded).unwrap();
    assert_eq!(json["question"], "value added tax rate");
    assert_eq!(json["hits"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn rebuilding_into_a_filled_collection_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let docs = collection(&tmp).await;
    let p = pipeline(docs.clone(), Arc::new(HashEmbedder::new(DIM)));
    let first = p.build(&tax_corpus()).await.unwrap();
    let err = p.build(&tax_corpus()).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateId(ref id) if id == "chunk_0"), "{err}");
    assert_eq!(docs.count().await.unwrap(), first);

    docs.clear().await.unwrap();
    assert_eq!(p.build(&tax_corpus()).await.unwrap(), first);
}

#[tokio::test]
async fn rebuild_replaces_contents_only_after_embedding() {
    let tmp = TempDir::new().unwrap();
    let docs = collection(&tmp).await;
    let first = pipeline(docs.clone(), Arc::new(HashEmbedder::new(DIM))).build(&tax_corpus()).await.unwrap();

    let flaky = Flaky { inner: HashEmbedder::new(DIM), ok_batches: 0, calls: Default::default() };
    let err = pipeline(docs.clone(), Arc::new(flaky)).rebuild(&tax_corpus()).await.unwrap_err();
    assert!(matches!(err, Error::UpstreamEmbeddingFailure(_)));
    assert_eq!(docs.count().await.unwrap(), first);

    let err = pipeline(docs.clone(), Arc::new(HashEmbedder::new(DIM / 2)))
        .rebuild(&tax_corpus())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: DIM, .. }), "{err}");
    assert_eq!(docs.count().await.unwrap(), first);

    let renamed: Arc<dyn Embedder> = Arc::new(Renamed(HashEmbedder::new(DIM)));
    let rebuilt = pipeline(docs.clone(), renamed.clone())
        .rebuild(&corpus(&[("new.txt", "fresh text")]))
        .await
        .unwrap();
    assert_eq!(rebuilt, 1);
    assert_eq!(docs.count().await.unwrap(), 1);
    assert_eq!(docs.embedder_id().await.unwrap().as_deref(), Some(renamed.embedder_id()));
}

#[tokio::test]
async fn blank_corpus_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let docs = collection(&tmp).await;
    let p = pipeline(docs.clone(), Arc::new(HashEmbedder::new(DIM)));
    assert!(matches!(p.build(&Corpus::new()).await, Err(Error::EmptyCorpus)));
    assert!(matches!(p.build(&corpus(&[("a.txt", "  \n\t ")])).await, Err(Error::EmptyCorpus)));
    assert_eq!(docs.count().await.unwrap(), 0);
}

#[tokio::test]
async fn invalid_chunking_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let docs = collection(&tmp).await;
    let err = pipeline(docs.clone(), Arc::new(HashEmbedder::new(DIM)))
        .with_chunking(ChunkingConfig::new(100, 100))
        .build(&tax_corpus())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfiguration(_)));
    assert_eq!(docs.count().await.unwrap(), 0);
}

#[tokio::test]
async fn embedding_failure_leaves_collection_untouched() {
    let tmp = TempDir::new().unwrap();
    let docs = collection(&tmp).await;
    let flaky = Flaky { inner: HashEmbedder::new(DIM), ok_batches: 1, calls: Default::default() };
    let err = pipeline(docs.clone(), Arc::new(flaky))
        .with_chunking(ChunkingConfig::new(20, 5))
        .with_batch_size(2)
        .build(&tax_corpus())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UpstreamEmbeddingFailure(ref msg) if msg.contains("went away")), "{err}");
    assert_eq!(docs.count().await.unwrap(), 0);
    assert_eq!(docs.embedder_id().await.unwrap(), None);

    let err = pipeline(docs.clone(), Arc::new(Short(HashEmbedder::new(DIM))))
        .build(&tax_corpus())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UpstreamEmbeddingFailure(_)));
    assert_eq!(docs.count().await.unwrap(), 0);
}

#[tokio::test]
async fn other_embedder_cannot_query_or_extend() {
    let tmp = TempDir::new().unwrap();
    let docs = collection(&tmp).await;
    pipeline(docs.clone(), Arc::new(HashEmbedder::new(DIM))).build(&tax_corpus()).await.unwrap();

    let renamed: Arc<dyn Embedder> = Arc::new(Renamed(HashEmbedder::new(DIM)));
    let err = Retriever::new(docs.clone(), renamed.clone()).retrieve("tax", 3).await.unwrap_err();
    assert!(matches!(err, Error::EmbedderMismatch { .. }));
    let err = pipeline(docs.clone(), renamed)
        .build(&corpus(&[("new.txt", "fresh text")]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EmbedderMismatch { .. }));

    let narrow: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(DIM / 2));
    let err = Retriever::new(docs, narrow).retrieve("tax", 3).await.unwrap_err();
    assert!(matches!(err, Error::EmbedderMismatch { .. }), "{err}");
}

#[tokio::test]
async fn empty_store_retrieves_nothing() {
    let tmp = TempDir::new().unwrap();
    let docs = collection(&tmp).await;
    let retriever = Retriever::new(docs, Arc::new(HashEmbedder::new(DIM)));
    let hits = retriever.retrieve("anything at all", 5).await.unwrap();
    assert!(hits.is_empty());
    assert_eq!(format_context(&hits), "");
    let grounded = retriever.ground("anything at all", 5).await.unwrap();
    assert_eq!(grounded.context_used, 0);
    assert!(grounded.sources.is_empty());
}

#[tokio::test]
async fn builds_from_a_corpus_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("processed/extracted_texts.json");
    save_corpus(&path, &tax_corpus()).unwrap();
    let docs = collection(&tmp).await;
    let built = pipeline(docs.clone(), Arc::new(HashEmbedder::new(DIM)))
        .build_from_file(&path)
        .await
        .unwrap();
    assert_eq!(built, 3);
    assert!(matches!(
        pipeline(docs, Arc::new(HashEmbedder::new(DIM))).build_from_file(&tmp.path().join("nope.json")).await,
        Err(Error::InvalidCorpus(_))
    ));
}
