use std::path::Path;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, instrument};

use docrag_core::config::Settings;
use docrag_core::corpus::load_corpus;
use docrag_core::{chunk_document, Chunk, ChunkMetadata, ChunkingConfig, Corpus, Embedder, EmbeddingRecord, Error, Result};
use docrag_vector::Collection;

pub const DEFAULT_EMBED_BATCH_SIZE: usize = 32;

/// Chunk → embed → store, as one all-or-nothing operation.
pub struct IndexingPipeline {
    collection: Collection,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    batch_size: usize,
    show_progress: bool,
}

impl IndexingPipeline {
    pub fn new(collection: Collection, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            collection,
            embedder,
            chunking: ChunkingConfig::default(),
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
            show_progress: true,
        }
    }

    pub fn from_settings(collection: Collection, embedder: Arc<dyn Embedder>, settings: &Settings) -> Self {
        Self::new(collection, embedder)
            .with_chunking(settings.chunking)
            .with_batch_size(settings.embed.batch_size)
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Index every document of `corpus`; returns the number of records stored.
    ///
    /// All chunks are embedded before anything is written, and the write is a
    /// single `add`, so on error the collection is left as it was.
    #[instrument(skip_all, fields(collection = %self.collection.name(), documents = corpus.len()))]
    pub async fn build(&self, corpus: &Corpus) -> Result<usize> {
        self.collection.check_embedder(self.embedder.embedder_id()).await?;
        let records = self.embed_corpus(corpus)?;
        self.store(&records).await
    }

    /// Replace the collection's contents with `corpus`.
    ///
    /// The corpus is chunked and embedded before the collection is cleared, so
    /// a chunking or embedding failure keeps the previous index.
    #[instrument(skip_all, fields(collection = %self.collection.name(), documents = corpus.len()))]
    pub async fn rebuild(&self, corpus: &Corpus) -> Result<usize> {
        let records = self.embed_corpus(corpus)?;
        if let Some(dim) = self.collection.dim().await? {
            if let Some(r) = records.iter().find(|r| r.vector.len() != dim) {
                return Err(Error::DimensionMismatch { expected: dim, found: r.vector.len() });
            }
        }
        self.collection.clear().await?;
        self.store(&records).await
    }

    async fn store(&self, records: &[EmbeddingRecord]) -> Result<usize> {
        let added = self.collection.add(records).await?;
        self.collection.bind_embedder(self.embedder.embedder_id()).await?;
        info!(added, embedder = self.embedder.embedder_id(), "index built");
        Ok(added)
    }

    fn embed_corpus(&self, corpus: &Corpus) -> Result<Vec<EmbeddingRecord>> {
        self.chunking.validate()?;
        if self.batch_size == 0 {
            return Err(Error::InvalidConfiguration("embed batch size must be at least 1".into()));
        }

        let mut chunks: Vec<Chunk> = Vec::new();
        for (source_id, text) in corpus {
            let doc_chunks = chunk_document(source_id, text, &self.chunking)?;
            debug!(source = %source_id, chunks = doc_chunks.len(), "chunked document");
            chunks.extend(doc_chunks);
        }
        if chunks.is_empty() {
            return Err(Error::EmptyCorpus);
        }
        info!(chunks = chunks.len(), "chunked corpus");

        let vectors = self.embed_all(&chunks)?;
        Ok(chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(n, (chunk, vector))| EmbeddingRecord {
                id: format!("chunk_{n}"),
                metadata: ChunkMetadata::for_chunk(&chunk),
                text: chunk.text,
                vector,
            })
            .collect())
    }

    /// Load a corpus JSON file, then [`build`](Self::build) it.
    pub async fn build_from_file(&self, path: &Path) -> Result<usize> {
        let corpus = load_corpus(path)?;
        self.build(&corpus).await
    }

    fn embed_all(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let pb = self.progress_bar(chunks.len());
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = self.embedder.embed_batch(&texts).map_err(Error::embedding)?;
            if embedded.len() != texts.len() {
                pb.abandon();
                return Err(Error::UpstreamEmbeddingFailure(format!(
                    "embedder returned {} vectors for {} inputs",
                    embedded.len(),
                    texts.len()
                )));
            }
            vectors.extend(embedded);
            pb.inc(batch.len() as u64);
        }
        pb.finish_with_message("embedded");
        Ok(vectors)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}
