use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::embed::{check_inputs, normalize, Embedder, Embedding};
use crate::{Error, Result};

/// MiniLM embedder using sentence-transformers/all-MiniLM-L6-v2.
///
/// Uses fastembed for ONNX-based inference. This model produces 384-dimensional
/// embeddings. `TextEmbedding::embed` needs `&mut self`, so the model sits
/// behind a mutex and one embedder can serve every session.
pub struct MiniLmEmbedder {
    model: Mutex<TextEmbedding>,
}

impl MiniLmEmbedder {
    /// Create a new MiniLM embedder.
    ///
    /// Downloads the model on first use (~90MB).
    pub fn new() -> Result<Self> {
        let opts = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_show_download_progress(true);

        TextEmbedding::try_new(opts)
            .map(|model| Self {
                model: Mutex::new(model),
            })
            .map_err(|e| Error::Embedding(e.to_string()))
    }
}

impl Embedder for MiniLmEmbedder {
    fn model_name(&self) -> &str {
        "sentence-transformers/all-MiniLM-L6-v2"
    }

    fn dimension(&self) -> usize {
        384
    }

    fn encode(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        check_inputs(texts)?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut model = self
            .model
            .lock()
            .map_err(|_| Error::Embedding("embedding model lock poisoned".to_string()))?;
        let mut embeddings = model
            .embed(texts, None)
            .map_err(|e| Error::Embedding(e.to_string()))?;
        drop(model);

        if embeddings.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "model returned {} embeddings for {} texts",
                embeddings.len(),
                texts.len()
            )));
        }
        // fastembed already normalizes MiniLM output; renormalize to keep the
        // unit-norm guarantee independent of the model config
        for embedding in &mut embeddings {
            normalize(embedding)?;
        }
        Ok(embeddings)
    }
}
