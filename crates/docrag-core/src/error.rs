use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Empty corpus: no non-whitespace chunks were produced")]
    EmptyCorpus,

    #[error("Duplicate record id: {0}")]
    DuplicateId(String),

    #[error("Dimension mismatch: collection expects {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Embedder mismatch: collection was built with '{expected}', got '{found}'")]
    EmbedderMismatch { expected: String, found: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Embedding failed: {0}")]
    UpstreamEmbeddingFailure(String),

    #[error("Invalid corpus: {0}")]
    InvalidCorpus(String),
}

impl Error {
    /// Wrap any backend failure (LanceDB, Arrow, filesystem) as `StoreUnavailable`.
    pub fn store<E: std::fmt::Display>(err: E) -> Self {
        Self::StoreUnavailable(format!("{err:#}"))
    }

    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        Self::UpstreamEmbeddingFailure(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
