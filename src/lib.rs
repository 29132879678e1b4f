//! scrapscope library
//!
//! Semantic search for Scrapbox projects: incremental embedding sync and
//! similarity queries over pages and lines.
//!
//! # Modules
//!
//! - `core`: Documents, project export reader, notation, configuration
//! - `search`: Embedding providers, vector stores, index engine

pub mod core;
pub mod search;

// Re-exports for convenience
pub use self::core::config::Config;
pub use self::core::document::{Document, DocumentKind, Hit};
pub use self::core::project::{Page, Project};
pub use self::search::{Embedder, Index, ScopeError, VectorStore};
