//! Error taxonomy for indexing and retrieval.

use thiserror::Error;

/// Errors surfaced by the index engine and its collaborators.
#[derive(Debug, Error)]
pub enum ScopeError {
    /// A collection already exists with a different vector dimension.
    #[error("collection '{collection}' has dimension {actual}, expected {expected}")]
    SchemaMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    /// Stored vectors were computed by another embedder than the one in use.
    #[error("collection '{collection}' was embedded with '{actual}', not '{expected}'; run sync again")]
    ModelMismatch {
        collection: String,
        expected: String,
        actual: String,
    },

    /// The collection exists but its layout cannot hold single unnamed vectors.
    #[error("collection '{collection}' is incompatible: {reason}")]
    IncompatibleSchema { collection: String, reason: String },

    /// The collection does not exist; it is created by the first sync.
    #[error("collection '{0}' does not exist")]
    UnknownCollection(String),

    /// The vector store could not be reached or failed to serve a request.
    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),

    /// The embedding provider could not produce a vector.
    #[error("embedding failed: {0}")]
    EmbeddingFailure(String),

    /// The project export could not be parsed into pages and lines.
    #[error("invalid project export: {0}")]
    SourceFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScopeError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl From<rusqlite::Error> for ScopeError {
    fn from(e: rusqlite::Error) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScopeError>;
