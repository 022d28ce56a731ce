//! Text embedding backends
//!
//! Every backend produces L2-normalized vectors, so the inner product of two
//! embeddings is their cosine similarity.
//!
//! # Backends
//!
//! - [`MiniLmEmbedder`]: all-MiniLM-L6-v2 via fastembed (ONNX runtime), 384 dims
//! - [`OllamaEmbedder`]: a model served by a local Ollama instance
//! - [`HashingEmbedder`]: deterministic feature hashing, no model required
//!
//! [`LazyEmbedder`] defers building any of them until the first embedding.
//!
//! # Empty input
//!
//! Text that is empty after trimming is rejected with [`Error::Embedding`] by
//! every backend, so an empty string never reaches an index.
//!
//! # Usage
//!
//! ```ignore
//! use ragchat_lib::embed::{Embedder, MiniLmEmbedder};
//!
//! let embedder = MiniLmEmbedder::new()?;
//!
//! let docs = embedder.encode(&["apple pie recipe", "stock market news"])?;
//! let query = embedder.encode_one("baking recipe")?;
//! ```

use std::sync::Arc;

use crate::config::{EmbedderBackend, EmbedderConfig};
use crate::{Error, Result};

/// A vector embedding - fixed size array of floats
pub type Embedding = Vec<f32>;

/// Trait for text embedding models
///
/// Implementations are shared by all sessions, so methods take `&self`.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one embedding per input in input order.
    fn encode(&self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Embed a single text.
    fn encode_one(&self, text: &str) -> Result<Embedding> {
        self.encode(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("model returned no embeddings".to_string()))
    }

    /// Returns the embedding dimension
    fn dimension(&self) -> usize;

    /// Returns the model name/identifier
    fn model_name(&self) -> &str;
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn encode(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        (**self).encode(texts)
    }

    fn encode_one(&self, text: &str) -> Result<Embedding> {
        (**self).encode_one(text)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

impl<E: Embedder + ?Sized> Embedder for Arc<E> {
    fn encode(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        (**self).encode(texts)
    }

    fn encode_one(&self, text: &str) -> Result<Embedding> {
        (**self).encode_one(text)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Build the backend selected by the configuration.
pub fn from_config(config: &EmbedderConfig) -> Result<Box<dyn Embedder>> {
    let embedder: Box<dyn Embedder> = match config.backend {
        EmbedderBackend::MiniLm => Box::new(MiniLmEmbedder::new()?),
        EmbedderBackend::Ollama => Box::new(OllamaEmbedder::new(config)?),
        EmbedderBackend::Hashing => Box::new(HashingEmbedder::new(config.hashing_dimension)?),
    };
    tracing::info!(
        model = embedder.model_name(),
        dimension = embedder.dimension(),
        "embedder ready"
    );
    Ok(embedder)
}

/// Reject texts that are empty after trimming.
pub(crate) fn check_inputs(texts: &[&str]) -> Result<()> {
    match texts.iter().position(|t| t.trim().is_empty()) {
        Some(i) => Err(Error::Embedding(format!("cannot embed empty text (input {i})"))),
        None => Ok(()),
    }
}

/// Scale `vector` to unit Euclidean norm in place.
///
/// Fails when the vector is zero or contains non-finite values, since such a
/// vector cannot take part in cosine similarity.
pub fn normalize(vector: &mut [f32]) -> Result<()> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !norm.is_finite() || norm <= f32::EPSILON {
        return Err(Error::Embedding(format!(
            "degenerate embedding (norm {norm})"
        )));
    }
    vector.iter_mut().for_each(|x| *x /= norm);
    Ok(())
}

mod hashing;
mod lazy;
mod minilm;
mod ollama;

pub use hashing::*;
pub use lazy::*;
pub use minilm::*;
pub use ollama::*;
