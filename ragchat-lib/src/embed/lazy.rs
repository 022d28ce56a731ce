use std::sync::{Mutex, OnceLock, PoisonError};

use crate::config::EmbedderConfig;
use crate::embed::{from_config, Embedder, Embedding};
use crate::Result;

/// Embedder that builds its backend on first use.
///
/// Operations that never embed (stats, retrieval from an empty session) then
/// work without loading a model or reaching a server. A failed build is
/// retried on the next call.
pub struct LazyEmbedder {
    config: EmbedderConfig,
    inner: OnceLock<Box<dyn Embedder>>,
    init: Mutex<()>,
}

impl LazyEmbedder {
    #[must_use]
    pub fn new(config: EmbedderConfig) -> Self {
        Self {
            config,
            inner: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    /// Whether the backend has been built.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.inner.get().is_some()
    }

    fn get(&self) -> Result<&dyn Embedder> {
        if let Some(embedder) = self.inner.get() {
            return Ok(embedder.as_ref());
        }
        // one build at a time, model loading is expensive
        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(embedder) = self.inner.get() {
            return Ok(embedder.as_ref());
        }
        let embedder = from_config(&self.config)?;
        Ok(self.inner.get_or_init(|| embedder).as_ref())
    }
}

impl Embedder for LazyEmbedder {
    fn encode(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        self.get()?.encode(texts)
    }

    fn encode_one(&self, text: &str) -> Result<Embedding> {
        self.get()?.encode_one(text)
    }

    /// Builds the backend; 0 when it cannot be built.
    fn dimension(&self) -> usize {
        match self.get() {
            Ok(embedder) => embedder.dimension(),
            Err(e) => {
                tracing::warn!(error = %e, "embedder unavailable");
                0
            }
        }
    }

    /// Builds the backend; "unavailable" when it cannot be built.
    fn model_name(&self) -> &str {
        match self.get() {
            Ok(embedder) => embedder.model_name(),
            Err(e) => {
                tracing::warn!(error = %e, "embedder unavailable");
                "unavailable"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbedderBackend;
    use crate::session::SessionManager;
    use crate::Error;

    fn hashing_config() -> EmbedderConfig {
        EmbedderConfig {
            backend: EmbedderBackend::Hashing,
            hashing_dimension: 32,
            ..EmbedderConfig::default()
        }
    }

    fn unreachable_ollama() -> EmbedderConfig {
        EmbedderConfig {
            backend: EmbedderBackend::Ollama,
            ollama_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..EmbedderConfig::default()
        }
    }

    #[test]
    fn test_builds_on_first_encode() {
        let lazy = LazyEmbedder::new(hashing_config());
        assert!(!lazy.is_loaded());

        assert_eq!(lazy.encode_one("hello").unwrap().len(), 32);
        assert!(lazy.is_loaded());
        assert_eq!(lazy.dimension(), 32);
    }

    #[test]
    fn test_empty_session_needs_no_backend() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(LazyEmbedder::new(unreachable_ollama()), dir.path());

        assert_eq!(manager.retrieve("fresh", "anything", 4).unwrap(), "");
        assert_eq!(manager.stats("fresh").unwrap().documents, 0);
        assert!(!manager.embedder().is_loaded());
    }

    #[test]
    fn test_build_failure_is_reported_on_encode() {
        let lazy = LazyEmbedder::new(unreachable_ollama());
        assert!(matches!(lazy.encode(&["text"]), Err(Error::Embedding(_))));
        assert!(!lazy.is_loaded());
    }
}
