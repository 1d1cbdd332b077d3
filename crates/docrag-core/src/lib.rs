#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod chunker;
pub mod config;
pub mod corpus;
pub mod error;
pub mod traits;
pub mod types;

pub use chunker::{chunk, chunk_document, ChunkingConfig};
pub use error::{Error, Result};
pub use traits::Embedder;
pub use types::{Chunk, ChunkMetadata, Corpus, EmbeddingRecord, SearchHit};
