//! Runtime configuration
//!
//! Loaded from `$RAGCHAT_CONFIG` or `~/.ollama_chat/ragchat.toml`, falling
//! back to defaults when no file exists. A few environment variables override
//! the file: `RAGCHAT_DATA_DIR`, `RAGCHAT_EMBEDDER` and `OLLAMA_HOST`.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Which embedding backend to build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderBackend {
    #[default]
    MiniLm,
    Ollama,
    Hashing,
}

impl FromStr for EmbedderBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minilm" => Ok(Self::MiniLm),
            "ollama" => Ok(Self::Ollama),
            "hashing" => Ok(Self::Hashing),
            other => Err(Error::Config(format!("unknown embedder backend '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub backend: EmbedderBackend,
    /// Base URL of the Ollama server
    pub ollama_url: String,
    /// Ollama embedding model name
    pub ollama_model: String,
    /// Request timeout for networked backends
    pub timeout_secs: u64,
    /// Vector size of the hashing backend
    pub hashing_dimension: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            backend: EmbedderBackend::default(),
            ollama_url: "http://127.0.0.1:11434".to_string(),
            ollama_model: "nomic-embed-text".to_string(),
            timeout_secs: 30,
            hashing_dimension: 384,
        }
    }
}

/// Top-level configuration of the retrieval subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Directory holding the per-session index and metadata files
    pub data_dir: PathBuf,
    /// Number of documents returned by a default retrieval
    pub top_k: usize,
    /// Text placed between retrieved documents
    pub separator: String,
    /// Keep loaded sessions in memory between calls
    pub cache_sessions: bool,
    pub embedder: EmbedderConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_dir: base_dir().join("rag"),
            top_k: 4,
            separator: "\n---\n".to_string(),
            cache_sessions: true,
            embedder: EmbedderConfig::default(),
        }
    }
}

impl RagConfig {
    /// Load configuration from the default location and apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        // Load .env if present
        let _ = dotenvy::dotenv();

        let path = std::env::var_os("RAGCHAT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| base_dir().join("ragchat.toml"));
        let mut config = Self::load_from(&path)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from a specific path, falling back to defaults if
    /// the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::parse(&content).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(dir) = std::env::var_os("RAGCHAT_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(backend) = std::env::var("RAGCHAT_EMBEDDER") {
            self.embedder.backend = backend.parse()?;
        }
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            self.embedder.ollama_url = host;
        }
        Ok(())
    }
}

/// `~/.ollama_chat`, or a relative `.ollama_chat` when no home directory exists.
fn base_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".ollama_chat"))
        .unwrap_or_else(|| PathBuf::from(".ollama_chat"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RagConfig::default();
        assert_eq!(config.top_k, 4);
        assert_eq!(config.separator, "\n---\n");
        assert!(config.cache_sessions);
        assert!(config.data_dir.ends_with("rag"));
        assert_eq!(config.embedder.backend, EmbedderBackend::MiniLm);
    }

    #[test]
    fn test_parse_partial_file() {
        let config = RagConfig::parse(
            r#"
            data_dir = "/tmp/rag"
            top_k = 8

            [embedder]
            backend = "hashing"
            hashing_dimension = 128
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/rag"));
        assert_eq!(config.top_k, 8);
        assert_eq!(config.separator, "\n---\n");
        assert_eq!(config.embedder.backend, EmbedderBackend::Hashing);
        assert_eq!(config.embedder.hashing_dimension, 128);
        assert_eq!(config.embedder.timeout_secs, 30);
    }

    #[test]
    fn test_parse_rejects_unknown_backend() {
        assert!(RagConfig::parse("[embedder]\nbackend = \"faiss\"").is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RagConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.top_k, 4);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "top_k = \"many\"").unwrap();
        assert!(matches!(RagConfig::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("MiniLM".parse::<EmbedderBackend>().unwrap(), EmbedderBackend::MiniLm);
        assert_eq!("ollama".parse::<EmbedderBackend>().unwrap(), EmbedderBackend::Ollama);
        assert!("nope".parse::<EmbedderBackend>().is_err());
    }
}
