//! Runtime configuration.
//!
//! Settings come from `<home>/config.yaml` when it exists, then from
//! `SCRAPSCOPE_*` environment variables. `<home>` is `$SCRAPSCOPE_HOME`, or
//! `.scrapscope` in the current directory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::search::engine::{QueryOptions, DEFAULT_TOP_K};

const CONFIG_FILE: &str = "config.yaml";
const DB_FILE: &str = "store.db";
const HOME_VAR: &str = "SCRAPSCOPE_HOME";

/// The built-in deterministic embedder.
pub const DEFAULT_MODEL: &str = "htp";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Qdrant,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "qdrant" => Ok(Self::Qdrant),
            other => bail!("unknown backend '{}' (expected sqlite or qdrant)", other),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Qdrant => write!(f, "qdrant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    /// Where the SQLite store and downloaded models live. Relative paths
    /// are resolved against `<home>`; unset means `<home>` itself.
    pub data_dir: Option<PathBuf>,
    pub qdrant_host: String,
    pub qdrant_port: u16,
    pub model: String,
    pub top_k: usize,
    pub min_score: Option<f32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            data_dir: None,
            qdrant_host: "localhost".to_string(),
            qdrant_port: 6334,
            model: DEFAULT_MODEL.to_string(),
            top_k: DEFAULT_TOP_K,
            min_score: None,
        }
    }
}

impl Config {
    /// Load from the process environment.
    pub fn load() -> Result<Self> {
        let home = match std::env::var(HOME_VAR) {
            Ok(home) => PathBuf::from(home),
            Err(_) => std::env::current_dir()?.join(".scrapscope"),
        };
        Self::load_from(&home, |key| std::env::var(key).ok())
    }

    /// Load `<home>/config.yaml` and apply overrides from `lookup`.
    pub fn load_from<F>(home: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = home.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_yaml::from_str::<Self>(&raw)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        } else {
            Self::default()
        };

        config.data_dir = Some(match config.data_dir.take() {
            None => home.to_path_buf(),
            Some(dir) if dir.is_relative() => home.join(dir),
            Some(dir) => dir,
        });

        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SCRAPSCOPE_BACKEND") {
            self.backend = v.parse()?;
        }
        if let Some(v) = lookup("SCRAPSCOPE_QDRANT_HOST") {
            self.qdrant_host = v;
        }
        if let Some(v) = lookup("SCRAPSCOPE_QDRANT_PORT") {
            self.qdrant_port = v
                .parse()
                .with_context(|| format!("Invalid SCRAPSCOPE_QDRANT_PORT '{}'", v))?;
        }
        if let Some(v) = lookup("SCRAPSCOPE_MODEL") {
            self.model = v;
        }
        if let Some(v) = lookup("SCRAPSCOPE_TOP_K") {
            self.top_k = v
                .parse()
                .with_context(|| format!("Invalid SCRAPSCOPE_TOP_K '{}'", v))?;
        }
        if let Some(v) = lookup("SCRAPSCOPE_MIN_SCORE") {
            self.min_score = Some(
                v.parse()
                    .with_context(|| format!("Invalid SCRAPSCOPE_MIN_SCORE '{}'", v))?,
            );
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            bail!("top_k must be at least 1");
        }
        if self.qdrant_host.trim().is_empty() {
            bail!("qdrant_host must not be empty");
        }
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        self.data_dir
            .as_deref()
            .unwrap_or_else(|| Path::new(".scrapscope"))
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join(DB_FILE)
    }

    pub fn model_cache_dir(&self) -> PathBuf {
        self.data_dir().join("models")
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            top_k: self.top_k,
            min_score: self.min_score,
        }
    }
}
