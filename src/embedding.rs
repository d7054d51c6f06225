//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`OllamaProvider`]** — calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`OpenAIProvider`]** — calls an OpenAI-compatible `/v1/embeddings` endpoint.
//!
//! Both send requests through [`ServiceClient`], which owns the timeout and
//! retry policy. Also provides the vector utilities used by the index:
//! - [`cosine_similarity`] — similarity between two embedding vectors
//! - [`vec_to_blob`] — encode a `Vec<f32>` as little-endian bytes
//! - [`blob_to_vec`] — decode those bytes back into a `Vec<f32>`
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use health_rag::config::EmbeddingConfig;
//! # use health_rag::embedding::create_provider;
//! let config = EmbeddingConfig::default(); // provider = "ollama"
//! let provider = create_provider(&config, "nomic-embed-text").unwrap();
//! assert_eq!(provider.model_name(), "nomic-embed-text");
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::service::{RetryPolicy, ServiceClient, ServiceError};

/// Maps text to fixed-length vectors.
///
/// Implementations must return exactly one vector per input text, in input
/// order, and every vector from one provider must have the same length.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;

    /// Vector dimensionality, when known without calling the service.
    fn dims(&self) -> Option<usize>;

    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;
}

/// Embed a single query text.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    text: &str,
) -> Result<Vec<f32>, ServiceError> {
    provider
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::InvalidResponse {
            url: provider.model_name().to_string(),
            message: "empty embedding response".to_string(),
        })
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default: `http://localhost:11434`).
/// Requires the model to be pulled first (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaProvider {
    model: String,
    dims: Option<usize>,
    client: ServiceClient,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig, model: &str) -> Result<Self> {
        let client = ServiceClient::new(
            config.url(),
            Duration::from_secs(config.timeout_secs),
            RetryPolicy::new(config.max_retries),
        )?;
        Ok(Self {
            model: model.to_string(),
            dims: config.dims,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let body = json!({
            "model": self.model,
            "input": texts,
        });
        let json = self.client.post_json("/api/embed", &body).await?;
        let url = format!("{}/api/embed", self.client.base_url());
        let vectors = parse_ollama_response(&json).map_err(|message| ServiceError::InvalidResponse {
            url: url.clone(),
            message,
        })?;
        check_count(&url, &vectors, texts.len())?;
        Ok(vectors)
    }
}

fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>, String> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or("missing embeddings array")?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .ok_or_else(|| "embedding is not an array".to_string())
                .and_then(|values| parse_vector(values))
        })
        .collect()
}

// ============ OpenAI Provider ============

/// Default base URL for the OpenAI provider.
pub const OPENAI_URL: &str = "https://api.openai.com";

/// Embedding provider for the OpenAI embeddings API (or a compatible server).
///
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAIProvider {
    model: String,
    dims: Option<usize>,
    client: ServiceClient,
}

impl OpenAIProvider {
    /// # Errors
    ///
    /// Returns an error if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig, model: &str) -> Result<Self> {
        let Ok(api_key) = std::env::var("OPENAI_API_KEY") else {
            bail!("OPENAI_API_KEY environment variable not set");
        };
        let client = ServiceClient::new(
            config.url.as_deref().unwrap_or(OPENAI_URL),
            Duration::from_secs(config.timeout_secs),
            RetryPolicy::new(config.max_retries),
        )?
        .with_bearer(api_key);
        Ok(Self {
            model: model.to_string(),
            dims: config.dims,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let body = json!({
            "model": self.model,
            "input": texts,
        });
        let json = self.client.post_json("/v1/embeddings", &body).await?;
        let url = format!("{}/v1/embeddings", self.client.base_url());
        let vectors = parse_openai_response(&json).map_err(|message| ServiceError::InvalidResponse {
            url: url.clone(),
            message,
        })?;
        check_count(&url, &vectors, texts.len())?;
        Ok(vectors)
    }
}

/// Extracts `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>, String> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or("missing data array")?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let values = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or("missing embedding")?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, parse_vector(values)?));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn parse_vector(values: &[Value]) -> Result<Vec<f32>, String> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| format!("non-numeric embedding value: {}", v))
        })
        .collect()
}

fn check_count(url: &str, vectors: &[Vec<f32>], expected: usize) -> Result<(), ServiceError> {
    if vectors.len() != expected {
        return Err(ServiceError::InvalidResponse {
            url: url.to_string(),
            message: format!("expected {} embeddings, got {}", expected, vectors.len()),
        });
    }
    Ok(())
}

/// Create the [`EmbeddingProvider`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
pub fn create_provider(config: &EmbeddingConfig, model: &str) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "ollama" => Ok(Box::new(OllamaProvider::new(config, model)?)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config, model)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as little-endian f32 bytes.
///
/// # Example
///
/// ```rust
/// use health_rag::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode bytes written by [`vec_to_blob`]. Trailing partial values are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors
/// of different lengths, and zero vectors.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
