//! Embedding backend abstraction and adapters.
//!
//! Defines the [`EmbeddingBackend`] trait and concrete implementations:
//! - **`LocalBackend`** — runs models locally via fastembed; no network calls
//!   after the first model download. The default.
//! - **[`OllamaBackend`]** — calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`OpenAiBackend`]** — calls the OpenAI embeddings API.
//!
//! Every backend returns L2-normalized vectors so a cosine index behaves as
//! expected. Failures are returned as-is; there is no retry.
//!
//! # Backend Selection
//!
//! | Provider | Backend | Dimensions |
//! |----------|---------|------------|
//! | `"local"` | `LocalBackend` | from the model table |
//! | `"ollama"` | [`OllamaBackend`] | `embedding.dims` |
//! | `"openai"` | [`OpenAiBackend`] | `embedding.dims` |

#[cfg(feature = "local-embeddings-fastembed")]
mod local;

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalBackend;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::ConfigError;

/// Maps batches of text to fixed-length vectors.
///
/// Implementations are constructed once per run; construction may be
/// expensive (model loading) and is where missing models or credentials
/// surface.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Returns the model identifier (e.g. `"all-MiniLM-L6-v2"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts.
    ///
    /// Returns one vector per input, in input order, each of length
    /// [`dims`](EmbeddingBackend::dims).
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Construct the backend selected by `config.provider` for `model`.
pub async fn create_backend(
    config: &EmbeddingConfig,
    model: &str,
) -> Result<Box<dyn EmbeddingBackend>> {
    match config.provider.as_str() {
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Box::new(
            LocalBackend::new(model, config.batch_size).await?,
        )),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding backend requires --features local-embeddings-fastembed"
        ),
        "ollama" => Ok(Box::new(OllamaBackend::new(config, model)?)),
        "openai" => Ok(Box::new(OpenAiBackend::new(config, model)?)),
        other => Err(ConfigError::UnknownProvider(other.to_string()).into()),
    }
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn required_dims(config: &EmbeddingConfig, provider: &str) -> Result<usize> {
    match config.dims {
        Some(dims) if dims > 0 => Ok(dims),
        _ => bail!("embedding.dims must be > 0 when provider is '{}'", provider),
    }
}

fn json_vector(value: &serde_json::Value, what: &str) -> Result<Vec<f32>> {
    let items = value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Invalid {} response: embedding is not an array", what))?;
    let mut vec: Vec<f32> = items
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect();
    l2_normalize(&mut vec);
    Ok(vec)
}

// ============ Ollama Backend ============

/// Embedding backend using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default:
/// `http://localhost:11434`). Requires Ollama to be running with the model
/// pulled (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaBackend {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
}

impl OllamaBackend {
    pub fn new(config: &EmbeddingConfig, model: &str) -> Result<Self> {
        let dims = required_dims(config, "ollama")?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            client: reqwest::Client::new(),
            model: model.to_string(),
            dims,
            url: url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url,
                    e
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| json_vector(embedding, "Ollama"))
        .collect()
}

// ============ OpenAI Backend ============

/// Embedding backend using the OpenAI API.
///
/// Calls `POST /v1/embeddings`. Requires the `OPENAI_API_KEY` environment
/// variable and `embedding.dims`.
pub struct OpenAiBackend {
    client: reqwest::Client,
    model: String,
    dims: usize,
    api_key: String,
}

impl OpenAiBackend {
    pub fn new(config: &EmbeddingConfig, model: &str) -> Result<Self> {
        let dims = required_dims(config, "openai")?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            client: reqwest::Client::new(),
            model: model.to_string(),
            dims,
            api_key,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "dimensions": self.dims,
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        indexed.push((index, json_vector(embedding, "OpenAI")?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = json!({ "embeddings": [[1.0, 0.0], [0.0, 2.0]] });
        let vecs = parse_ollama_response(&json).unwrap();
        assert_eq!(vecs.len(), 2);
        assert_eq!(vecs[1], vec![0.0, 1.0]);
        assert!(parse_ollama_response(&json!({})).is_err());
    }

    #[test]
    fn test_parse_openai_response_reorders_by_index() {
        let json = json!({
            "data": [
                { "index": 1, "embedding": [0.0, 5.0] },
                { "index": 0, "embedding": [2.0, 0.0] }
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        for v in &vecs {
            assert!((norm(v) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_http_backends_require_dims() {
        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            ..Default::default()
        };
        assert!(OllamaBackend::new(&config, "nomic-embed-text").is_err());

        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            dims: Some(768),
            url: Some("http://ollama:11434/".to_string()),
            ..Default::default()
        };
        let backend = OllamaBackend::new(&config, "nomic-embed-text").unwrap();
        assert_eq!(backend.dims(), 768);
        assert_eq!(backend.url, "http://ollama:11434");
    }

    #[tokio::test]
    async fn test_unknown_provider_is_config_error() {
        let config = EmbeddingConfig {
            provider: "magic".to_string(),
            ..Default::default()
        };
        let err = match create_backend(&config, "x").await {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert!(crate::error::is_config_error(&err));
    }
}
