use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::config::EmbedderConfig;
use crate::embed::{check_inputs, normalize, Embedder, Embedding};
use crate::{Error, Result};

/// Blocking embedder backed by an Ollama server's `/api/embed` endpoint.
///
/// The dimension is not known up front, so construction sends one probe
/// request. Timeouts and HTTP failures are reported as [`Error::Embedding`].
pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimension: usize,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbedderConfig) -> Result<Self> {
        if config.ollama_model.trim().is_empty() {
            return Err(Error::InvalidInput("missing Ollama model name".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Embedding(format!("failed to build HTTP client: {e}")))?;
        let endpoint = format!("{}/api/embed", config.ollama_url.trim_end_matches('/'));

        let mut embedder = Self {
            client,
            endpoint,
            model: config.ollama_model.clone(),
            dimension: 0,
        };
        let probe = embedder.request(&["dimension probe"])?;
        embedder.dimension = probe.first().map(Vec::len).unwrap_or(0);
        if embedder.dimension == 0 {
            return Err(Error::Embedding(format!(
                "{} returned an empty embedding",
                embedder.model
            )));
        }
        tracing::debug!(model = %embedder.model, dimension = embedder.dimension, "ollama embedder probed");
        Ok(embedder)
    }

    fn request(&self, inputs: &[&str]) -> Result<Vec<Embedding>> {
        let body = EmbedRequest {
            model: &self.model,
            input: inputs,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Embedding(format!("request to {} timed out", self.endpoint))
                } else {
                    Error::Embedding(format!("request to {} failed: {e}", self.endpoint))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(Error::Embedding(format!(
                "ollama embed request failed ({status}): {text}"
            )));
        }

        let text = resp
            .text()
            .map_err(|e| Error::Embedding(format!("failed to read ollama response: {e}")))?;
        parse_response(&text, inputs.len())
    }
}

impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        check_inputs(texts)?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts)
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

fn parse_response(body: &str, expected: usize) -> Result<Vec<Embedding>> {
    let parsed: EmbedResponse = serde_json::from_str(body)
        .map_err(|e| Error::Embedding(format!("failed to parse ollama response: {e}")))?;
    if parsed.embeddings.len() != expected {
        return Err(Error::Embedding(format!(
            "ollama returned {} embeddings for {} inputs",
            parsed.embeddings.len(),
            expected
        )));
    }

    let mut embeddings = parsed.embeddings;
    for embedding in &mut embeddings {
        normalize(embedding)?;
    }
    Ok(embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_normalizes() {
        let body = r#"{"model":"nomic-embed-text","embeddings":[[3.0,4.0],[0.0,2.0]]}"#;
        let embeddings = parse_response(body, 2).unwrap();
        assert_eq!(embeddings.len(), 2);
        assert!((embeddings[0][0] - 0.6).abs() < 1e-6);
        assert!((embeddings[1][1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_parse_response_count_mismatch() {
        let body = r#"{"embeddings":[[1.0,0.0]]}"#;
        assert!(matches!(parse_response(body, 2), Err(Error::Embedding(_))));
    }

    #[test]
    fn test_parse_response_garbage() {
        assert!(matches!(parse_response("not json", 1), Err(Error::Embedding(_))));
    }

    #[test]
    fn test_unreachable_server_is_embedding_error() {
        let config = EmbedderConfig {
            ollama_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            ..EmbedderConfig::default()
        };
        assert!(matches!(OllamaEmbedder::new(&config), Err(Error::Embedding(_))));
    }
}
