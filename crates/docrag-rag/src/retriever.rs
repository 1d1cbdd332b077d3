use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use docrag_core::{Embedder, Error, Result, SearchHit};
use docrag_vector::Collection;

/// Question → nearest stored chunks.
pub struct Retriever {
    collection: Collection,
    embedder: Arc<dyn Embedder>,
}

/// Everything an answer generator needs for one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundedContext {
    pub question: String,
    pub context: String,
    pub sources: Vec<String>,
    pub context_used: usize,
    pub hits: Vec<SearchHit>,
}

impl Retriever {
    pub fn new(collection: Collection, embedder: Arc<dyn Embedder>) -> Self {
        Self { collection, embedder }
    }

    /// Up to `k` hits, nearest first. An empty collection yields no hits.
    #[instrument(skip(self), fields(collection = %self.collection.name()))]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        self.collection.check_embedder(self.embedder.embedder_id()).await?;
        let vector = self.embedder.embed_one(query).map_err(Error::embedding)?;
        let hits = self.collection.query(&vector, k).await?;
        debug!(hits = hits.len(), "retrieved");
        Ok(hits)
    }

    pub async fn ground(&self, question: &str, k: usize) -> Result<GroundedContext> {
        let hits = self.retrieve(question, k).await?;
        Ok(GroundedContext {
            question: question.to_string(),
            context: format_context(&hits),
            sources: sources(&hits),
            context_used: context_used(&hits),
            hits,
        })
    }
}

/// Render hits, in the order given, as numbered context blocks.
pub fn format_context(hits: &[SearchHit]) -> String {
    let mut out = String::new();
    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&format!(
            "\n--- Document {} ---\nSource: {}\nPart: {}/{}\n{}\n",
            i + 1,
            hit.metadata.source,
            hit.metadata.position_index + 1,
            hit.metadata.total_chunks,
            hit.text
        ));
    }
    out
}

/// Distinct source names in first-seen order.
pub fn sources(hits: &[SearchHit]) -> Vec<String> {
    let mut seen = HashSet::new();
    hits.iter()
        .filter(|h| seen.insert(h.metadata.source.as_str()))
        .map(|h| h.metadata.source.clone())
        .collect()
}

pub fn context_used(hits: &[SearchHit]) -> usize {
    hits.len()
}
