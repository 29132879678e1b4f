//! Embedding providers.
//!
//! An [`Embedder`] turns text into a fixed-dimension vector. Providers are
//! constructed cold and become ready either through [`Embedder::preload`] or
//! implicitly on the first [`Embedder::embed`] call.
//!
//! The built-in provider is Harmonic Token Projection (HTP), a deterministic,
//! training-free embedding:
//! "Harmonic Token Projection: A Vocabulary-Free, Training-Free,
//!  Deterministic, and Reversible Embedding Methodology"
//! https://arxiv.org/html/2511.20665

use std::f64::consts::PI;

use once_cell::sync::OnceCell;
use tracing::debug;

use super::error::Result;

/// Embedding dimension (2 * number of coprime moduli)
/// Using 192 moduli → 384 dimensions (matching common transformer dims)
pub const EMBEDDING_DIM: usize = 384;

/// Number of coprime moduli for harmonic projection
const NUM_MODULI: usize = EMBEDDING_DIM / 2;

/// Maximum token length (Unicode code points)
const MAX_TOKEN_LENGTH: usize = 64;

/// Text to vector provider.
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// Vector length; constant for the provider's lifetime.
    fn dimensions(&self) -> usize;

    /// Load whatever the provider needs before the first embedding.
    /// Idempotent.
    fn preload(&self) -> Result<()>;

    fn is_ready(&self) -> bool;

    /// Embed one text. Same input, same vector. Empty text is valid input.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Deterministic HTP embedder.
#[derive(Default)]
pub struct HtpEmbedder {
    moduli: OnceCell<Vec<u64>>,
}

impl HtpEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    fn moduli(&self) -> &[u64] {
        self.moduli.get_or_init(|| {
            debug!(moduli = NUM_MODULI, "building HTP moduli table");
            first_primes(NUM_MODULI)
        })
    }

    /// Embed a single token using Harmonic Token Projection
    ///
    /// Steps:
    /// 1. Encode the token's code points as a base-2^16 integer N
    /// 2. For each modulus m_i, compute r_i = N mod m_i
    /// 3. Project to unit circle: E_i = [sin(2πr_i/m_i), cos(2πr_i/m_i)]
    fn embed_token(&self, token: &str, out: &mut [f64]) {
        let n = token_to_integer(token);

        for (i, &m) in self.moduli().iter().enumerate() {
            let theta = 2.0 * PI * ((n % m) as f64) / (m as f64);
            out[2 * i] += theta.sin();
            out[2 * i + 1] += theta.cos();
        }
    }
}

impl Embedder for HtpEmbedder {
    fn name(&self) -> &str {
        "htp"
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }

    fn preload(&self) -> Result<()> {
        self.moduli();
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.moduli.get().is_some()
    }

    /// Mean of the token projections, L2 normalized.
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Ok(vec![0.0; EMBEDDING_DIM]);
        }

        let mut sum = vec![0.0f64; EMBEDDING_DIM];
        for token in &tokens {
            self.embed_token(token, &mut sum);
        }

        let count = tokens.len() as f64;
        for val in &mut sum {
            *val /= count;
        }

        let norm: f64 = sum.iter().map(|x| x * x).sum::<f64>().sqrt();
        let embedding = if norm > 0.0 {
            sum.iter().map(|x| (*x / norm) as f32).collect()
        } else {
            sum.iter().map(|x| *x as f32).collect()
        };

        Ok(embedding)
    }
}

/// N = Σ u_j * B^(L-j) where B = 2^16, wrapping on overflow
fn token_to_integer(token: &str) -> u64 {
    token
        .chars()
        .take(MAX_TOKEN_LENGTH)
        .fold(0u64, |n, c| n.wrapping_mul(65536).wrapping_add(c as u64))
}

/// Lowercased words split on whitespace and ASCII punctuation
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

/// First `count` primes; pairwise coprime by construction.
fn first_primes(count: usize) -> Vec<u64> {
    let mut primes: Vec<u64> = Vec::with_capacity(count);
    let mut candidate = 2u64;
    while primes.len() < count {
        if primes
            .iter()
            .take_while(|&&p| p * p <= candidate)
            .all(|&p| candidate % p != 0)
        {
            primes.push(candidate);
        }
        candidate += 1;
    }
    primes
}

/// Cosine similarity between two embeddings; 0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

#[cfg(feature = "fastembed")]
pub use self::fast::{FastEmbedder, PARAPHRASE_MULTILINGUAL};

#[cfg(feature = "fastembed")]
mod fast {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use fastembed::{InitOptions, TextEmbedding};
    use once_cell::sync::OnceCell;
    use tracing::info;

    use super::Embedder;
    use crate::search::error::{Result, ScopeError};

    pub const PARAPHRASE_MULTILINGUAL: &str = "paraphrase-multilingual-minilm-l12-v2";

    /// sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2 via fastembed.
    ///
    /// Model weights are downloaded into `cache_dir` on first load.
    pub struct FastEmbedder {
        cache_dir: PathBuf,
        // fastembed's embed() needs &mut self
        model: OnceCell<Mutex<TextEmbedding>>,
    }

    impl FastEmbedder {
        pub fn new(cache_dir: PathBuf) -> Self {
            Self {
                cache_dir,
                model: OnceCell::new(),
            }
        }

        fn model(&self) -> Result<&Mutex<TextEmbedding>> {
            self.model.get_or_try_init(|| {
                info!(model = PARAPHRASE_MULTILINGUAL, "loading embedding model");
                let options =
                    InitOptions::new(fastembed::EmbeddingModel::ParaphraseMLMiniLML12V2)
                        .with_cache_dir(self.cache_dir.clone())
                        .with_show_download_progress(true);
                TextEmbedding::try_new(options)
                    .map(Mutex::new)
                    .map_err(|e| ScopeError::EmbeddingFailure(e.to_string()))
            })
        }
    }

    impl Embedder for FastEmbedder {
        fn name(&self) -> &str {
            PARAPHRASE_MULTILINGUAL
        }

        fn dimensions(&self) -> usize {
            384
        }

        fn preload(&self) -> Result<()> {
            self.model().map(|_| ())
        }

        fn is_ready(&self) -> bool {
            self.model.get().is_some()
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut model = self.model()?.lock().map_err(|e| {
                ScopeError::EmbeddingFailure(format!("model lock poisoned: {}", e))
            })?;

            model
                .embed(vec![text], None)
                .map_err(|e| ScopeError::EmbeddingFailure(e.to_string()))?
                .into_iter()
                .next()
                .ok_or_else(|| ScopeError::EmbeddingFailure("no embedding returned".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_htp_basic() {
        let model = HtpEmbedder::new();

        let emb1 = model.embed("hello world").unwrap();
        let emb2 = model.embed("hello world").unwrap();
        let emb3 = model.embed("goodbye moon").unwrap();

        assert_eq!(emb1, emb2);
        assert_ne!(emb1, emb3);
        assert_eq!(emb1.len(), EMBEDDING_DIM);
    }

    #[test]
    fn test_htp_shared_tokens_score_higher() {
        let model = HtpEmbedder::new();

        let query = model.embed("sugar").unwrap();
        let sugar = model.embed("Add sugar").unwrap();
        let flour = model.embed("Add flour").unwrap();

        assert!(cosine_similarity(&query, &sugar) > cosine_similarity(&query, &flour));
    }

    #[test]
    fn test_htp_deterministic() {
        let model1 = HtpEmbedder::new();
        let model2 = HtpEmbedder::new();

        let text = "This is a test sentence for HTP";
        assert_eq!(model1.embed(text).unwrap(), model2.embed(text).unwrap());
    }

    #[test]
    fn test_lazy_and_eager_init() {
        let lazy = HtpEmbedder::new();
        assert!(!lazy.is_ready());
        let v = lazy.embed("first call").unwrap();
        assert!(lazy.is_ready());

        let eager = HtpEmbedder::new();
        eager.preload().unwrap();
        eager.preload().unwrap();
        assert!(eager.is_ready());
        assert_eq!(eager.embed("first call").unwrap(), v);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let model = HtpEmbedder::new();
        for text in ["", "   ", "!?."] {
            let v = model.embed(text).unwrap();
            assert_eq!(v.len(), EMBEDDING_DIM);
            assert!(v.iter().all(|x| *x == 0.0));
        }
    }

    #[test]
    fn test_first_primes() {
        let primes = first_primes(NUM_MODULI);
        assert_eq!(&primes[..10], &[2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
        assert_eq!(primes.len(), NUM_MODULI);
        assert_eq!(*primes.last().unwrap(), 1163);
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);

        assert_eq!(cosine_similarity(&a, &[0.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
    }

    #[test]
    fn test_multilingual_input() {
        let model = HtpEmbedder::new();

        let emb_ko = model.embed("한국어 테스트").unwrap();
        let norm: f32 = emb_ko.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }
}
