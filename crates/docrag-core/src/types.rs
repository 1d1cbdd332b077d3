//! Domain types shared by the chunker, the index store and the retriever.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub type ChunkId = String;

/// Document identifier → extracted text. Sorted by identifier so a corpus is
/// always traversed in the same order.
pub type Corpus = BTreeMap<String, String>;

/// A window of a source document, tagged with its position.
///
/// - `source_id`: identifier of the owning document (usually a file path)
/// - `position_index`: zero-based ordinal among the document's chunks
/// - `total_chunks`: number of chunks the document produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_id: String,
    pub position_index: usize,
    pub total_chunks: usize,
}

/// Provenance stored next to every embedded chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Display name of the source (last path component of `source_path`).
    pub source: String,
    pub source_path: String,
    pub position_index: usize,
    pub total_chunks: usize,
}

impl ChunkMetadata {
    pub fn for_chunk(chunk: &Chunk) -> Self {
        Self {
            source: display_name(&chunk.source_id),
            source_path: chunk.source_id.clone(),
            position_index: chunk.position_index,
            total_chunks: chunk.total_chunks,
        }
    }
}

/// One row of the index store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: ChunkId,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A ranked query result. Lower `distance` is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub distance: f32,
}

/// File name of a document identifier, falling back to the identifier itself.
pub fn display_name(source_id: &str) -> String {
    Path::new(source_id)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| source_id.to_string())
}
