//! Indexing and retrieval on top of the chunker, an embedder and the index store.
//!
//! `IndexingPipeline` turns a corpus into stored records; `Retriever` turns a
//! question into ranked chunks and the context block handed to an answer
//! generator.

pub mod pipeline;
pub mod retriever;

pub use pipeline::IndexingPipeline;
pub use retriever::{context_used, format_context, sources, GroundedContext, Retriever};

use docrag_core::config::StoreSettings;
use docrag_core::Result;
use docrag_vector::{Collection, IndexStore};

/// Open the configured store and its collection.
pub async fn open_collection(settings: &StoreSettings) -> Result<Collection> {
    let store = IndexStore::open(&settings.resolved_path()).await?;
    store.open_or_create(&settings.collection).await
}
