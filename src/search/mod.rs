//! Semantic search over Scrapbox projects
//!
//! Pages and their lines are embedded into one collection per project and
//! queried together.

pub mod embedding;
pub mod engine;
pub mod error;
pub mod memory;
#[cfg(feature = "qdrant")]
pub mod qdrant;
pub mod vectordb;

pub use embedding::{Embedder, HtpEmbedder};
pub use engine::{Index, IndexStats, QueryOptions, SyncProgress, SyncReport};
pub use error::{Result, ScopeError};
pub use memory::MemoryStore;
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantStore;
pub use vectordb::{ScoredPoint, SqliteStore, VectorStore};
