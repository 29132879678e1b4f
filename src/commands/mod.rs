pub mod list;
pub mod prune;
pub mod search;
pub mod status;
pub mod sync;

use anyhow::{bail, Context, Result};

use scrapscope::core::config::{Backend, Config, DEFAULT_MODEL};
use scrapscope::search::{Embedder, HtpEmbedder, SqliteStore, VectorStore};

/// Open the configured vector store.
pub fn open_store(config: &Config) -> Result<Box<dyn VectorStore>> {
    match config.backend {
        Backend::Sqlite => {
            let path = config.db_path();
            let store = SqliteStore::open(&path)
                .with_context(|| format!("Failed to open store at {}", path.display()))?;
            Ok(Box::new(store))
        }
        #[cfg(feature = "qdrant")]
        Backend::Qdrant => {
            let store = scrapscope::search::QdrantStore::connect(
                &config.qdrant_host,
                config.qdrant_port,
            )
            .with_context(|| {
                format!(
                    "Failed to connect to qdrant at {}:{}",
                    config.qdrant_host, config.qdrant_port
                )
            })?;
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "qdrant"))]
        Backend::Qdrant => bail!("qdrant backend requires building with --features qdrant"),
    }
}

/// Construct the configured embedding model. Nothing is loaded yet.
pub fn load_embedder(config: &Config) -> Result<Box<dyn Embedder>> {
    match config.model.as_str() {
        DEFAULT_MODEL => Ok(Box::new(HtpEmbedder::new())),
        #[cfg(feature = "fastembed")]
        scrapscope::search::embedding::PARAPHRASE_MULTILINGUAL => Ok(Box::new(
            scrapscope::search::embedding::FastEmbedder::new(config.model_cache_dir()),
        )),
        other => bail!("Unknown embedding model '{}'", other),
    }
}
